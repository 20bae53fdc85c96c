//! Relay delivery: dispatch queue, lanes and the HTTP forwarder.
//!
//! Admitted messages are appended to an unbounded FIFO queue and consumed by a
//! fixed number of lanes. Each lane performs exactly one forwarding attempt per
//! message and only takes the next message once that attempt has completed, so
//! at most `worker_count` deliveries are in flight at any time.
//!
//! # Attempt lifecycle
//!
//! 1. **Dequeue** - Lane takes the oldest waiting message
//! 2. **Validate** - Malformed messages are discarded without network I/O
//! 3. **Forward** - One POST bounded by the configured timeout
//! 4. **Signal** - A completion event is emitted, success or failure
//!
//! Any HTTP status received within the timeout completes the attempt
//! successfully. Failures are logged and never retried.
//!
//! # Example
//!
//! ```no_run
//! use hookrelay_core::Message;
//! use hookrelay_delivery::{DeliveryConfig, DeliveryEngine, DeliveryError};
//!
//! # async fn example() -> std::result::Result<(), DeliveryError> {
//! let mut engine = DeliveryEngine::new(DeliveryConfig::default())?;
//! engine.start().await?;
//!
//! let message = Message::new("https://example.com/hook", r#"{"a":1}"#)
//!     .map_err(|e| DeliveryError::internal(e.to_string()))?;
//! engine.queue().enqueue(message)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod engine;
pub mod error;
pub mod queue;
pub mod worker;
pub mod worker_pool;

pub use client::{
    AttemptOutcome, ClientConfig, DeliveryClient, DeliveryResponse, Forwarder, ATTEMPT_ID_HEADER,
};
pub use engine::{DeliveryConfig, DeliveryEngine, EngineStats};
pub use error::{DeliveryError, Result};
pub use queue::{DispatchQueue, QueueConfig, QueueReceiver};

/// Default number of concurrent delivery lanes.
pub const DEFAULT_WORKER_COUNT: usize = 1;

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
