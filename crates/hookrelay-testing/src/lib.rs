//! Test infrastructure for the relay pipeline.
//!
//! Provides an HTTP sink standing in for delivery targets, forwarders that
//! replace the HTTP client inside lanes, and an event handler that collects
//! completion events for assertions.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
pub mod forwarder;
pub mod http;

pub use events::{CollectingEventHandler, DEFAULT_EVENT_TIMEOUT};
pub use forwarder::{PanickingForwarder, RecordingForwarder};
pub use http::MockSink;
