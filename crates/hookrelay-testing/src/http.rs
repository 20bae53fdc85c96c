//! HTTP sink standing in for a delivery target.

use std::time::Duration;

use wiremock::{matchers, Mock, MockServer, Request, ResponseTemplate};

/// Wiremock server that records every request it receives.
///
/// Responses are configured per path; unmatched requests get wiremock's
/// default 404, which still counts as a delivered attempt.
pub struct MockSink {
    server: MockServer,
}

impl MockSink {
    /// Starts a sink on a random local port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URI of the sink, without a trailing slash.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Absolute URL for a path on the sink.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Answers `POST path` with the given status.
    pub async fn respond_with_status(&self, path: &str, status: u16) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(path))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers `POST path` only after `delay`.
    ///
    /// With a delay longer than the relay timeout this simulates a target that
    /// never responds.
    pub async fn respond_after(&self, path: &str, status: u16, delay: Duration) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(path))
            .respond_with(ResponseTemplate::new(status).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// All requests received so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Bodies of all requests received so far, in arrival order.
    pub async fn received_bodies(&self) -> Vec<String> {
        self.requests()
            .await
            .into_iter()
            .map(|request| String::from_utf8_lossy(&request.body).into_owned())
            .collect()
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.requests().await.len()
    }

    /// Polls until at least `count` requests arrived or `timeout` elapses.
    ///
    /// Returns the number of requests seen when it stopped waiting.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let seen = self.request_count().await;
            if seen >= count || tokio::time::Instant::now() >= deadline {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Underlying wiremock server for custom expectations.
    pub fn server(&self) -> &MockServer {
        &self.server
    }
}
