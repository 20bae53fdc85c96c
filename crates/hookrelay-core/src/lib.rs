//! Core domain models and completion events.
//!
//! Provides the message and delivery attempt types, the completion event
//! system, and the error taxonomy shared by the ingress and delivery crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;

pub use error::{RelayError, Result};
pub use events::{
    DeliveryEvent, DeliveryFailedEvent, DeliverySucceededEvent, EventHandler, FailureReason,
    MessageDiscardedEvent, MulticastEventHandler, NoOpEventHandler,
};
pub use models::{AttemptId, AttemptState, DeliveryAttempt, Message};
