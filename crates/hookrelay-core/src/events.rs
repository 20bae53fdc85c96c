//! Completion events for delivery attempts.
//!
//! Every message a lane takes off the queue produces exactly one event:
//! succeeded, failed or discarded. Handlers observe outcomes without the
//! delivery path depending on them.
//!
//! ```text
//!                  Succeeded/Failed/Discarded
//! ┌─────────────────┐        Events         ┌────────────────────┐
//! │ DeliveryLane    │ ─────────────────────▶│ MulticastHandler   │
//! │ (Producer)      │                       │ (Event Dispatcher) │
//! └─────────────────┘                       └────────────────────┘
//!                                                     │
//!                                                     ▼
//!                                            stats, tests, audit
//! ```

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AttemptId;

/// Events emitted by delivery lanes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeliveryEvent {
    /// Target answered within the timeout.
    Succeeded(DeliverySucceededEvent),

    /// Attempt ended without a response.
    Failed(DeliveryFailedEvent),

    /// Message was malformed and never sent.
    Discarded(MessageDiscardedEvent),
}

impl DeliveryEvent {
    /// Attempt this event completes.
    pub fn attempt_id(&self) -> AttemptId {
        match self {
            Self::Succeeded(event) => event.attempt_id,
            Self::Failed(event) => event.attempt_id,
            Self::Discarded(event) => event.attempt_id,
        }
    }

    /// Whether the target received the payload.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Event emitted when the target returns any HTTP status within the timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySucceededEvent {
    /// Unique ID for this delivery attempt.
    pub attempt_id: AttemptId,

    /// URI the payload was posted to.
    pub target: String,

    /// HTTP status code returned by the target, 4xx and 5xx included.
    pub status_code: u16,

    /// Time from send to response headers.
    pub duration: Duration,

    /// When the attempt completed.
    pub completed_at: DateTime<Utc>,
}

/// Event emitted when a delivery attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailedEvent {
    /// Unique ID for this delivery attempt.
    pub attempt_id: AttemptId,

    /// URI that was attempted.
    pub target: String,

    /// Failure category.
    pub reason: FailureReason,

    /// Error that ended the attempt.
    pub error_message: String,

    /// Time spent before giving up.
    pub duration: Duration,

    /// When the attempt failed.
    pub failed_at: DateTime<Utc>,
}

/// Event emitted when a malformed message is dropped at dequeue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDiscardedEvent {
    /// Attempt ID assigned at dequeue.
    pub attempt_id: AttemptId,

    /// Validation error that caused the discard.
    pub reason: String,

    /// When the message was dropped.
    pub discarded_at: DateTime<Utc>,
}

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Connection could not be established within the timeout.
    RequestTimeout,
    /// Request was sent but no response arrived within the timeout.
    ResponseTimeout,
    /// Socket-level failure such as a reset or refused connection.
    Transport,
    /// Target URI could not be used to build a request.
    InvalidTarget,
    /// Unexpected fault inside the lane.
    InternalFault,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestTimeout => write!(f, "request_timeout"),
            Self::ResponseTimeout => write!(f, "response_timeout"),
            Self::Transport => write!(f, "transport"),
            Self::InvalidTarget => write!(f, "invalid_target"),
            Self::InternalFault => write!(f, "internal_fault"),
        }
    }
}

/// Trait for handling delivery events.
///
/// Handlers run on the lane after the attempt completes and before the lane
/// takes its next message, so they should be quick. Failures inside a
/// handler are its own to log; they never reach the delivery path.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a delivery event.
    async fn handle_event(&self, event: DeliveryEvent);
}

/// No-op event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DeliveryEvent) {}
}

/// Multi-cast event handler that forwards events to multiple subscribers.
///
/// Events are delivered to all subscribers concurrently.
#[derive(Debug, Clone)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a new multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber to receive delivery events.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for MulticastEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}
