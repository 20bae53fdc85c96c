//! Forwarders replacing the HTTP client inside delivery lanes.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use hookrelay_core::{AttemptId, Message};
use hookrelay_delivery::{AttemptOutcome, DeliveryResponse, Forwarder};

/// Forwarder that records every message and tracks peak concurrency.
///
/// Each call holds for `delay` before answering with `status_code`, which
/// keeps attempts overlapping long enough to observe the lane bound.
#[derive(Debug)]
pub struct RecordingForwarder {
    delay: Duration,
    status_code: u16,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    received: Mutex<Vec<Message>>,
}

impl RecordingForwarder {
    /// Forwarder answering 200 after `delay`.
    pub fn new(delay: Duration) -> Self {
        Self::with_status(delay, 200)
    }

    /// Forwarder answering `status_code` after `delay`.
    pub fn with_status(delay: Duration, status_code: u16) -> Self {
        Self {
            delay,
            status_code,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Highest number of overlapping `forward` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `forward` calls made so far.
    pub fn call_count(&self) -> usize {
        self.received.lock().map(|received| received.len()).unwrap_or_default()
    }

    /// Messages in the order their attempts started.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().map(|received| received.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(&self, _attempt_id: AttemptId, message: &Message) -> AttemptOutcome {
        if let Ok(mut received) = self.received.lock() {
            received.push(message.clone());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        AttemptOutcome::Delivered(DeliveryResponse {
            status_code: self.status_code,
            duration: self.delay,
            is_success: (200..300).contains(&self.status_code),
        })
    }
}

/// Forwarder that panics for bodies matching a marker and delivers the rest.
#[derive(Debug)]
pub struct PanickingForwarder {
    marker: String,
    delivered: AtomicUsize,
}

impl PanickingForwarder {
    /// Panics whenever the message body contains `marker`.
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into(), delivered: AtomicUsize::new(0) }
    }

    /// Number of messages delivered without panicking.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forwarder for PanickingForwarder {
    async fn forward(&self, _attempt_id: AttemptId, message: &Message) -> AttemptOutcome {
        if message.body.contains(&self.marker) {
            panic!("forwarder fault triggered by {}", self.marker);
        }

        self.delivered.fetch_add(1, Ordering::SeqCst);
        AttemptOutcome::Delivered(DeliveryResponse {
            status_code: 200,
            duration: Duration::ZERO,
            is_success: true,
        })
    }
}
