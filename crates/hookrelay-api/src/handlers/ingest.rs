//! Inbound notification handler.
//!
//! Validates the target header and body, canonicalizes JSON payloads and
//! appends the resulting message to the dispatch queue. The response is
//! `204 No Content` on every path, including a body upload that stalls;
//! rejections are only logged.

use axum::{
    body::{self, Body},
    extract::State,
    http::{header::CONTENT_LENGTH, HeaderMap, HeaderName, StatusCode},
};
use hookrelay_core::{Message, RelayError};
use tracing::{debug, error, info, instrument, warn};

use crate::{server::REQUEST_TIMEOUT, AppState};

/// Accepts a notification for relay.
///
/// Returns 204 whether or not the message was admitted: missing target,
/// empty or oversized body, undecodable body and queue rejection all end
/// in an error log and no enqueue.
#[instrument(
    name = "ingest_message",
    skip_all,
    fields(
        content_length = headers.get(CONTENT_LENGTH).and_then(|v| v.to_str().ok()).unwrap_or("unknown"),
    )
)]
pub async fn ingest_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    if let Some(message) = read_message(&state, &headers, body).await {
        let target = message.target.clone();
        match state.queue.enqueue(message) {
            Ok(()) => info!(target = %target, queue_depth = state.queue.depth(), "Message queued"),
            Err(e) => error!(target = %target, error = %e, "Message not queued"),
        }
    }

    StatusCode::NO_CONTENT
}

async fn read_message(state: &AppState, headers: &HeaderMap, body: Body) -> Option<Message> {
    let target = match extract_target(headers, &state.target_header) {
        Ok(target) => target,
        Err(e) => {
            error!(code = e.code(), error = %e, "Rejected inbound request");
            return None;
        },
    };

    let declared_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_length.is_some_and(|length| length > state.max_body_bytes) {
        let e = RelayError::PayloadTooLarge { limit_bytes: state.max_body_bytes };
        error!(code = e.code(), error = %e, target = %target, "Rejected inbound request");
        return None;
    }

    let read = tokio::time::timeout(REQUEST_TIMEOUT, body::to_bytes(body, state.max_body_bytes));
    let bytes = match read.await {
        Ok(Ok(bytes)) => bytes,
        Err(_elapsed) => {
            error!(
                timeout_ms = REQUEST_TIMEOUT.as_millis(),
                target = %target,
                "Request body not received in time"
            );
            return None;
        },
        Ok(Err(e)) => {
            error!(
                error = %e,
                limit_bytes = state.max_body_bytes,
                target = %target,
                "Failed to read request body"
            );
            return None;
        },
    };

    match build_message(target, &bytes) {
        Ok(message) => {
            debug!(payload_size = message.body_len(), "Inbound request accepted");
            Some(message)
        },
        Err(e) => {
            error!(code = e.code(), error = %e, "Rejected inbound request");
            None
        },
    }
}

/// Reads the delivery target from the configured header.
///
/// # Errors
///
/// Returns `RelayError::MissingTarget` when the header is absent, blank or
/// not visible ASCII.
pub fn extract_target(headers: &HeaderMap, header: &HeaderName) -> Result<String, RelayError> {
    let missing = || RelayError::MissingTarget { header: header.to_string() };

    let value = headers.get(header).ok_or_else(missing)?;
    let target = value.to_str().map_err(|_| {
        warn!(header = %header, "Target header is not visible ASCII");
        missing()
    })?;

    let target = target.trim();
    if target.is_empty() {
        return Err(missing());
    }

    Ok(target.to_string())
}

/// Builds a message from a target and raw request body.
///
/// # Errors
///
/// Returns `RelayError::EmptyBody` for an empty body and
/// `RelayError::InvalidEncoding` for a body that is not UTF-8.
pub fn build_message(target: String, raw: &[u8]) -> Result<Message, RelayError> {
    if raw.is_empty() {
        return Err(RelayError::EmptyBody);
    }

    let text = std::str::from_utf8(raw).map_err(|_| RelayError::InvalidEncoding)?;

    Message::new(target, canonicalize_body(text))
}

/// Re-serializes a JSON payload in compact form, keeping the sender's key
/// order.
///
/// Anything that does not parse as JSON is returned verbatim.
pub fn canonicalize_body(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => value.to_string(),
        Err(_) => raw.to_string(),
    }
}
