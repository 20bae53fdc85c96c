//! Core domain models and strongly-typed identifiers.
//!
//! Defines the relayed message, the per-attempt correlation identifier, and
//! the transient attempt record with its state transitions.

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// A notification waiting to be forwarded.
///
/// Built by the ingress once a request passes validation. The queue owns it
/// until a lane takes it; it is dropped after exactly one delivery attempt.
/// Fields are public so producers other than the ingress can enqueue
/// directly, which is why lanes validate again at dequeue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Destination URI for the outbound POST.
    pub target: String,
    /// Payload sent verbatim as the request body.
    pub body: String,
}

impl Message {
    /// Creates a validated message.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::MissingTarget` for an empty target and
    /// `RelayError::EmptyBody` for an empty body.
    pub fn new(target: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let message = Self { target: target.into(), body: body.into() };
        message.validate()?;
        Ok(message)
    }

    /// Checks that both target and body are present.
    ///
    /// # Errors
    ///
    /// Returns the first missing field as a `RelayError`.
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(RelayError::MissingTarget { header: "target".to_string() });
        }
        if self.body.is_empty() {
            return Err(RelayError::EmptyBody);
        }
        Ok(())
    }

    /// Payload size in bytes.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

/// Strongly-typed delivery attempt identifier.
///
/// Every attempt gets a fresh UUID v4 so concurrent deliveries to the same
/// target never share an identifier. The value travels with the attempt and
/// needs no cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Creates a new random attempt ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AttemptId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Delivery attempt lifecycle.
///
/// ```text
/// Pending -> InFlight -> Succeeded
///    |           └-----> Failed
///    └-----------------> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Dequeued, not yet handed to the forwarder.
    Pending,

    /// Outbound request in progress.
    InFlight,

    /// Target answered within the timeout, whatever the status code.
    Succeeded,

    /// Timed out, transport failure, or internal fault.
    Failed,
}

impl AttemptState {
    /// Whether the attempt has finished.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Transient record of one delivery attempt.
///
/// Owned by the lane that created it and dropped when the lane moves on.
#[derive(Debug)]
pub struct DeliveryAttempt {
    /// Correlation identifier for logs and the outbound request.
    pub id: AttemptId,
    /// Destination of the message being delivered.
    pub target: String,
    state: AttemptState,
    started_at: Option<Instant>,
}

impl DeliveryAttempt {
    /// Creates a pending attempt for a message.
    pub fn new(message: &Message) -> Self {
        Self::with_id(AttemptId::new(), message)
    }

    /// Creates a pending attempt under an identifier assigned by the caller.
    pub fn with_id(id: AttemptId, message: &Message) -> Self {
        Self { id, target: message.target.clone(), state: AttemptState::Pending, started_at: None }
    }

    /// Current state.
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Marks the attempt as in flight and starts its clock.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidTransition` unless the attempt is pending.
    pub fn begin(&mut self) -> Result<()> {
        self.transition(AttemptState::InFlight)?;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    /// Marks an in-flight attempt as succeeded.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidTransition` unless the attempt is in flight.
    pub fn succeed(&mut self) -> Result<()> {
        self.transition(AttemptState::Succeeded)
    }

    /// Marks a pending or in-flight attempt as failed.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::InvalidTransition` if the attempt already
    /// finished.
    pub fn fail(&mut self) -> Result<()> {
        self.transition(AttemptState::Failed)
    }

    /// Time since `begin`, or zero if the attempt never started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.map(|started| started.elapsed()).unwrap_or_default()
    }

    fn transition(&mut self, to: AttemptState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (AttemptState::Pending, AttemptState::InFlight)
                | (AttemptState::InFlight, AttemptState::Succeeded)
                | (AttemptState::Pending | AttemptState::InFlight, AttemptState::Failed)
        );

        if !allowed {
            return Err(RelayError::InvalidTransition { from: self.state, to });
        }

        self.state = to;
        Ok(())
    }
}
