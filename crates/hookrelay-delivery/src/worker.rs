//! Delivery lane: one sequential consumer of the dispatch queue.
//!
//! A lane takes a message, runs exactly one attempt through the forwarder,
//! emits the completion event and only then takes the next message. Faults
//! inside an attempt are contained here and never stop the loop.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use chrono::Utc;
use futures::FutureExt;
use hookrelay_core::{
    AttemptId, DeliveryAttempt, DeliveryEvent, DeliveryFailedEvent, DeliverySucceededEvent,
    EventHandler, FailureReason, Message, MessageDiscardedEvent,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    client::{AttemptOutcome, Forwarder},
    engine::EngineStats,
    error::Result,
    queue::QueueReceiver,
};

/// Sequential consumer of the dispatch queue.
pub struct DeliveryLane {
    id: usize,
    receiver: QueueReceiver,
    forwarder: Arc<dyn Forwarder>,
    event_handler: Arc<dyn EventHandler>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
}

impl DeliveryLane {
    /// Creates a new delivery lane.
    pub fn new(
        id: usize,
        receiver: QueueReceiver,
        forwarder: Arc<dyn Forwarder>,
        event_handler: Arc<dyn EventHandler>,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { id, receiver, forwarder, event_handler, stats, cancellation_token }
    }

    /// Lane identifier, unique within a pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Main lane loop - takes and delivers messages until cancelled or the
    /// queue is closed and drained.
    ///
    /// # Errors
    ///
    /// Currently never returns an error; attempt failures are events, not
    /// errors.
    pub async fn run(&self) -> Result<()> {
        info!(lane_id = self.id, "delivery lane starting");

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancellation_token.cancelled() => {
                    info!(lane_id = self.id, "delivery lane received shutdown signal");
                    break;
                }
                next = self.receiver.recv() => next,
            };

            let Some(message) = next else {
                info!(lane_id = self.id, "dispatch queue closed");
                break;
            };

            self.process_message(message).await;
        }

        info!(lane_id = self.id, "delivery lane stopped");
        Ok(())
    }

    /// Runs one attempt for a message and signals its completion.
    ///
    /// Always returns the completion event, including when the attempt
    /// panicked.
    pub async fn process_message(&self, message: Message) -> DeliveryEvent {
        let attempt_id = AttemptId::new();
        let target = message.target.clone();
        let started_at = Instant::now();

        self.stats.write().await.in_flight_deliveries += 1;

        let event = match AssertUnwindSafe(self.attempt(attempt_id, message)).catch_unwind().await
        {
            Ok(event) => event,
            Err(panic) => {
                let error_message = panic_message(panic.as_ref());
                error!(
                    lane_id = self.id,
                    attempt_id = %attempt_id,
                    target = %target,
                    error = %error_message,
                    "Unexpected error during delivery, attempt marked failed"
                );
                DeliveryEvent::Failed(DeliveryFailedEvent {
                    attempt_id,
                    target,
                    reason: FailureReason::InternalFault,
                    error_message,
                    duration: started_at.elapsed(),
                    failed_at: Utc::now(),
                })
            },
        };

        self.record(&event).await;
        self.event_handler.handle_event(event.clone()).await;
        event
    }

    async fn attempt(&self, attempt_id: AttemptId, message: Message) -> DeliveryEvent {
        debug!(lane_id = self.id, attempt_id = %attempt_id, payload = ?message, "Dequeued message");

        if let Err(error) = message.validate() {
            error!(
                lane_id = self.id,
                attempt_id = %attempt_id,
                error = %error,
                "Dequeued invalid message, discarding"
            );
            return DeliveryEvent::Discarded(MessageDiscardedEvent {
                attempt_id,
                reason: error.to_string(),
                discarded_at: Utc::now(),
            });
        }

        let mut attempt = DeliveryAttempt::with_id(attempt_id, &message);
        if let Err(error) = attempt.begin() {
            return internal_fault(&attempt, error.to_string());
        }

        debug!(lane_id = self.id, attempt_id = %attempt_id, "Sending request");
        let outcome = self.forwarder.forward(attempt.id, &message).await;

        let completed = match outcome {
            AttemptOutcome::Delivered(response) => attempt.succeed().map(|()| {
                DeliveryEvent::Succeeded(DeliverySucceededEvent {
                    attempt_id,
                    target: attempt.target.clone(),
                    status_code: response.status_code,
                    duration: response.duration,
                    completed_at: Utc::now(),
                })
            }),
            AttemptOutcome::Failed(error) => attempt.fail().map(|()| {
                DeliveryEvent::Failed(DeliveryFailedEvent {
                    attempt_id,
                    target: attempt.target.clone(),
                    reason: error.reason(),
                    error_message: error.to_string(),
                    duration: attempt.elapsed(),
                    failed_at: Utc::now(),
                })
            }),
        };

        let event = completed.unwrap_or_else(|error| internal_fault(&attempt, error.to_string()));

        debug!(
            lane_id = self.id,
            attempt_id = %attempt_id,
            state = %attempt.state(),
            "Attempt completed"
        );

        event
    }

    async fn record(&self, event: &DeliveryEvent) {
        let mut stats = self.stats.write().await;
        stats.in_flight_deliveries = stats.in_flight_deliveries.saturating_sub(1);
        stats.events_processed += 1;
        match event {
            DeliveryEvent::Succeeded(_) => stats.successful_deliveries += 1,
            DeliveryEvent::Failed(_) => stats.failed_deliveries += 1,
            DeliveryEvent::Discarded(_) => stats.discarded_messages += 1,
        }
    }
}

fn internal_fault(attempt: &DeliveryAttempt, error_message: String) -> DeliveryEvent {
    error!(attempt_id = %attempt.id, error = %error_message, "Attempt bookkeeping failed");
    DeliveryEvent::Failed(DeliveryFailedEvent {
        attempt_id: attempt.id,
        target: attempt.target.clone(),
        reason: FailureReason::InternalFault,
        error_message,
        duration: attempt.elapsed(),
        failed_at: Utc::now(),
    })
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use hookrelay_core::NoOpEventHandler;

    use super::*;
    use crate::{
        client::DeliveryResponse,
        error::DeliveryError,
        queue::{channel, QueueConfig},
    };

    #[derive(Debug)]
    struct FixedForwarder(fn() -> AttemptOutcome);

    #[async_trait]
    impl Forwarder for FixedForwarder {
        async fn forward(&self, _attempt_id: AttemptId, _message: &Message) -> AttemptOutcome {
            (self.0)()
        }
    }

    fn lane_with(forwarder: FixedForwarder) -> (DeliveryLane, Arc<RwLock<EngineStats>>) {
        let (_queue, receiver) = channel(&QueueConfig::default());
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let lane = DeliveryLane::new(
            0,
            receiver,
            Arc::new(forwarder),
            Arc::new(NoOpEventHandler::new()),
            stats.clone(),
            CancellationToken::new(),
        );
        (lane, stats)
    }

    fn message() -> Message {
        Message::new("http://localhost/hook", "{}").unwrap()
    }

    #[tokio::test]
    async fn delivered_outcome_becomes_success_event() {
        let (lane, stats) = lane_with(FixedForwarder(|| {
            AttemptOutcome::Delivered(DeliveryResponse {
                status_code: 503,
                duration: Duration::from_millis(3),
                is_success: false,
            })
        }));

        let event = lane.process_message(message()).await;

        match event {
            DeliveryEvent::Succeeded(succeeded) => assert_eq!(succeeded.status_code, 503),
            other => panic!("expected success, got {other:?}"),
        }
        let stats = stats.read().await;
        assert_eq!(stats.successful_deliveries, 1);
        assert_eq!(stats.in_flight_deliveries, 0);
    }

    #[tokio::test]
    async fn failed_outcome_keeps_reason() {
        let (lane, stats) = lane_with(FixedForwarder(|| {
            AttemptOutcome::Failed(DeliveryError::response_timeout(Duration::from_millis(50)))
        }));

        let event = lane.process_message(message()).await;

        match event {
            DeliveryEvent::Failed(failed) => {
                assert_eq!(failed.reason, FailureReason::ResponseTimeout);
            },
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(stats.read().await.failed_deliveries, 1);
    }

    #[tokio::test]
    async fn malformed_message_discarded_without_forwarding() {
        let (lane, stats) = lane_with(FixedForwarder(|| panic!("forwarder must not be called")));

        let event = lane
            .process_message(Message { target: String::new(), body: "{}".to_string() })
            .await;

        assert!(matches!(event, DeliveryEvent::Discarded(_)));
        let stats = stats.read().await;
        assert_eq!(stats.discarded_messages, 1);
        assert_eq!(stats.failed_deliveries, 0);
    }

    #[tokio::test]
    async fn panicking_forwarder_contained() {
        let (lane, stats) = lane_with(FixedForwarder(|| panic!("exploded while preparing")));

        let event = lane.process_message(message()).await;

        match event {
            DeliveryEvent::Failed(failed) => {
                assert_eq!(failed.reason, FailureReason::InternalFault);
                assert!(failed.error_message.contains("exploded while preparing"));
            },
            other => panic!("expected internal fault, got {other:?}"),
        }
        let stats = stats.read().await;
        assert_eq!(stats.in_flight_deliveries, 0);
        assert_eq!(stats.events_processed, 1);
    }

    #[test]
    fn panic_payloads_rendered() {
        let static_payload: Box<dyn Any + Send> = Box::new("static");
        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other_payload: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(static_payload.as_ref()), "static");
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");
        assert_eq!(panic_message(other_payload.as_ref()), "unknown panic payload");
    }
}
