//! Error types for message admission and attempt bookkeeping.
//!
//! Codes are stable so log lines can be grepped across releases. Admission
//! errors never reach the inbound caller; they exist for logging and tests.

use thiserror::Error;

use crate::models::AttemptState;

/// Result type alias using `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types with codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    // Admission Errors (E1001-E1004)
    /// Request carried no usable target address (E1001).
    #[error("[E1001] Missing target: request has no '{header}' header")]
    MissingTarget {
        /// Name of the header that was expected
        header: String,
    },

    /// Request or message body is empty (E1002).
    #[error("[E1002] Empty body: message payload is required")]
    EmptyBody,

    /// Request body exceeds the configured limit (E1003).
    #[error("[E1003] Payload too large: body exceeds {limit_bytes} bytes")]
    PayloadTooLarge {
        /// Configured maximum body size
        limit_bytes: usize,
    },

    /// Request body is not valid UTF-8 (E1004).
    #[error("[E1004] Invalid encoding: body is not valid UTF-8")]
    InvalidEncoding,

    // Attempt Errors (E2001)
    /// Attempt state machine rejected a transition (E2001).
    #[error("[E2001] Invalid transition: attempt cannot move from {from} to {to}")]
    InvalidTransition {
        /// State the attempt was in
        from: AttemptState,
        /// State that was requested
        to: AttemptState,
    },
}

impl RelayError {
    /// Returns the error code (E1001-E2001).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingTarget { .. } => "E1001",
            Self::EmptyBody => "E1002",
            Self::PayloadTooLarge { .. } => "E1003",
            Self::InvalidEncoding => "E1004",
            Self::InvalidTransition { .. } => "E2001",
        }
    }

    /// Returns whether this error was caused by the inbound request itself.
    pub const fn is_admission_error(&self) -> bool {
        matches!(
            self,
            Self::MissingTarget { .. }
                | Self::EmptyBody
                | Self::PayloadTooLarge { .. }
                | Self::InvalidEncoding
        )
    }
}
