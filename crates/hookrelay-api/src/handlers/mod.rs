//! HTTP request handlers for the relay ingress.
//!
//! - `ingest` - inbound notifications, always acknowledged with 204
//! - `health` - queue and lane statistics
//!
//! Rejected inbound requests are reported through logs only; the caller
//! never sees an error status from the ingest endpoint.

pub mod health;
pub mod ingest;

pub use health::health_check;
pub use ingest::{canonicalize_body, ingest_message};
