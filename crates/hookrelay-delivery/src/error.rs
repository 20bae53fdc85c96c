//! Error types for message delivery operations.
//!
//! Covers the ways a single attempt can end without a response (timeouts,
//! transport failures, unusable targets) plus queue admission and lane
//! lifecycle failures. Attempt-level errors map onto a `FailureReason` for
//! completion events.

use std::time::Duration;

use hookrelay_core::FailureReason;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for delivery operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection could not be established in time.
    #[error("request timeout: no connection after {timeout_ms}ms")]
    RequestTimeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// Request was sent but the target did not answer in time.
    #[error("response timeout: no response after {timeout_ms}ms")]
    ResponseTimeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// Network-level failure such as a refused or reset connection.
    #[error("network error: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// Target URI cannot be used for an outbound request.
    #[error("invalid target '{target}': {message}")]
    InvalidTarget {
        /// Target as received
        target: String,
        /// Parse or builder error
        message: String,
    },

    /// HTTP client could not be configured.
    #[error("invalid client configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Queue is at its configured depth limit.
    #[error("queue full: {max_depth} messages waiting")]
    QueueFull {
        /// Configured depth limit
        max_depth: usize,
    },

    /// Queue no longer accepts messages.
    #[error("queue closed")]
    QueueClosed,

    /// A lane task panicked and could not be recovered.
    #[error("lane {lane_id} panicked: {error}")]
    LanePanic {
        /// Lane that failed
        lane_id: usize,
        /// Panic payload or join error
        error: String,
    },

    /// Lanes did not stop within the shutdown timeout.
    #[error("lane shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },

    /// Unexpected internal error.
    #[error("internal delivery error: {message}")]
    InternalError {
        /// Internal error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a connect-phase timeout error.
    pub fn request_timeout(timeout: Duration) -> Self {
        Self::RequestTimeout { timeout_ms: duration_ms(timeout) }
    }

    /// Creates a response-phase timeout error.
    pub fn response_timeout(timeout: Duration) -> Self {
        Self::ResponseTimeout { timeout_ms: duration_ms(timeout) }
    }

    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates an invalid target error.
    pub fn invalid_target(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTarget { target: target.into(), message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Whether the attempt ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. } | Self::ResponseTimeout { .. })
    }

    /// Failure category used in completion events.
    ///
    /// Errors that are not about a single attempt (queue, lifecycle and
    /// configuration failures) fall under `InternalFault`.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::RequestTimeout { .. } => FailureReason::RequestTimeout,
            Self::ResponseTimeout { .. } => FailureReason::ResponseTimeout,
            Self::NetworkError { .. } => FailureReason::Transport,
            Self::InvalidTarget { .. } => FailureReason::InvalidTarget,
            Self::ConfigurationError { .. }
            | Self::QueueFull { .. }
            | Self::QueueClosed
            | Self::LanePanic { .. }
            | Self::ShutdownTimeout { .. }
            | Self::InternalError { .. } => FailureReason::InternalFault,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_identified_correctly() {
        assert!(DeliveryError::request_timeout(Duration::from_secs(5)).is_timeout());
        assert!(DeliveryError::response_timeout(Duration::from_secs(5)).is_timeout());

        assert!(!DeliveryError::network("connection reset").is_timeout());
        assert!(!DeliveryError::QueueClosed.is_timeout());
    }

    #[test]
    fn reasons_mapped_correctly() {
        assert_eq!(
            DeliveryError::request_timeout(Duration::from_millis(100)).reason(),
            FailureReason::RequestTimeout
        );
        assert_eq!(
            DeliveryError::response_timeout(Duration::from_millis(100)).reason(),
            FailureReason::ResponseTimeout
        );
        assert_eq!(DeliveryError::network("refused").reason(), FailureReason::Transport);
        assert_eq!(
            DeliveryError::invalid_target("not a uri", "relative URL without a base").reason(),
            FailureReason::InvalidTarget
        );
        assert_eq!(DeliveryError::internal("boom").reason(), FailureReason::InternalFault);
    }

    #[test]
    fn error_display_format() {
        let error = DeliveryError::response_timeout(Duration::from_millis(5000));
        assert_eq!(error.to_string(), "response timeout: no response after 5000ms");

        let full = DeliveryError::QueueFull { max_depth: 100 };
        assert_eq!(full.to_string(), "queue full: 100 messages waiting");
    }
}
