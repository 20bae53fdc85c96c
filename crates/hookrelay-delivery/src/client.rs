//! HTTP forwarder for relayed messages with a uniform timeout.
//!
//! One call performs one POST. The same timeout bounds connection setup and
//! the wait for response headers, so an attempt always resolves within that
//! timeout plus a short grace period. Redirects are not followed and nothing
//! is retried here.

use std::{
    fmt,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use hookrelay_core::{AttemptId, Message};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Slack on the response deadline so a stalled connect surfaces as a
/// connect timeout first.
const RESPONSE_GRACE: Duration = Duration::from_millis(100);

/// Header carrying the per-attempt correlation identifier.
pub const ATTEMPT_ID_HEADER: &str = "X-Relay-Attempt-Id";

/// Configuration for the forwarding client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bound for connection establishment and for the response wait.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Whether to verify TLS certificates of targets.
    pub verify_tls: bool,
    /// How long pooled keep-alive connections stay open while idle.
    pub pool_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(crate::DEFAULT_TIMEOUT_MS),
            user_agent: concat!("hookrelay/", env!("CARGO_PKG_VERSION")).to_string(),
            verify_tls: true,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Result of one forwarding attempt.
///
/// Any HTTP status counts as delivered; only the absence of a response is a
/// failure.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// Target answered within the timeout.
    Delivered(DeliveryResponse),
    /// Attempt ended without a response.
    Failed(DeliveryError),
}

impl AttemptOutcome {
    /// Whether the target answered.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Response metadata from a delivery attempt. The body is never read.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Time from send to response headers.
    pub duration: Duration,
    /// Whether the status was 2xx. Informational only.
    pub is_success: bool,
}

/// Performs one delivery attempt for a message.
///
/// Implementations must always resolve and must not panic on network
/// failures; they report them as `AttemptOutcome::Failed`. Lanes hold the
/// forwarder behind an `Arc`, so test doubles can replace the HTTP client.
#[async_trait]
pub trait Forwarder: Send + Sync + fmt::Debug {
    /// Delivers `message` once under the given correlation identifier.
    async fn forward(&self, attempt_id: AttemptId, message: &Message) -> AttemptOutcome;
}

/// HTTP client for relay delivery.
///
/// Wraps one pooled `reqwest::Client` shared by every lane. Connections use
/// `TCP_NODELAY` and TCP keep-alive and are kept in the pool between
/// attempts.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(DeliveryError::configuration("timeout must be greater than zero"));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .tcp_nodelay(true)
            .tcp_keepalive(config.timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a new delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Configured per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Posts the message body to its target.
    ///
    /// Dropping the in-flight request on timeout aborts it; other attempts
    /// sharing the pool are unaffected.
    ///
    /// # Errors
    ///
    /// - `InvalidTarget` when the target is not an absolute URI
    /// - `RequestTimeout` when no connection is established in time
    /// - `ResponseTimeout` when no response arrives in time
    /// - `NetworkError` for any other transport failure
    pub async fn deliver(
        &self,
        attempt_id: AttemptId,
        message: &Message,
    ) -> Result<DeliveryResponse> {
        let span = info_span!(
            "relay_delivery",
            attempt_id = %attempt_id,
            target = %message.target,
            payload_size = message.body_len()
        );

        async move {
            let start_time = Instant::now();
            let timeout = self.config.timeout;

            let url = reqwest::Url::parse(&message.target).map_err(|e| {
                tracing::error!(error = %e, "Target is not a valid URI");
                DeliveryError::invalid_target(&message.target, e.to_string())
            })?;

            tracing::debug!("Sending request");

            let request = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(ATTEMPT_ID_HEADER, attempt_id.to_string())
                .body(message.body.clone());

            let response = match tokio::time::timeout(timeout + RESPONSE_GRACE, request.send())
                .await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    let duration = start_time.elapsed();
                    if e.is_timeout() && e.is_connect() {
                        tracing::error!(
                            duration_ms = duration.as_millis(),
                            "Request has timed out: {}",
                            e
                        );
                        return Err(DeliveryError::request_timeout(timeout));
                    }
                    if e.is_timeout() {
                        tracing::error!(
                            duration_ms = duration.as_millis(),
                            "Response has timed out: {}",
                            e
                        );
                        return Err(DeliveryError::response_timeout(timeout));
                    }
                    if e.is_builder() {
                        tracing::error!("Request could not be built: {}", e);
                        return Err(DeliveryError::invalid_target(&message.target, e.to_string()));
                    }

                    tracing::error!(duration_ms = duration.as_millis(), "Request errored: {}", e);
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
                Err(_elapsed) => {
                    tracing::error!(
                        timeout_ms = timeout.as_millis(),
                        "Response has timed out, request aborted"
                    );
                    return Err(DeliveryError::response_timeout(timeout));
                },
            };

            let duration = start_time.elapsed();
            let status = response.status();

            if status.is_success() {
                tracing::info!(
                    status = status.as_u16(),
                    duration_ms = duration.as_millis(),
                    "Request ended with HTTP {}",
                    status.as_u16()
                );
            } else {
                tracing::warn!(
                    status = status.as_u16(),
                    duration_ms = duration.as_millis(),
                    "Request ended with HTTP {}",
                    status.as_u16()
                );
            }

            Ok(DeliveryResponse {
                status_code: status.as_u16(),
                duration,
                is_success: status.is_success(),
            })
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Forwarder for DeliveryClient {
    async fn forward(&self, attempt_id: AttemptId, message: &Message) -> AttemptOutcome {
        match self.deliver(attempt_id, message).await {
            Ok(response) => AttemptOutcome::Delivered(response),
            Err(error) => AttemptOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn message_to(url: String) -> Message {
        Message::new(url, r#"{"a":1}"#).unwrap()
    }

    #[tokio::test]
    async fn successful_delivery() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::body_string(r#"{"a":1}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let message = message_to(format!("{}/hook", mock_server.uri()));

        let response = client.deliver(AttemptId::new(), &message).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert!(response.is_success);
    }

    #[tokio::test]
    async fn server_error_is_still_delivered() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let message = message_to(format!("{}/hook", mock_server.uri()));

        let outcome = client.forward(AttemptId::new(), &message).await;

        match outcome {
            AttemptOutcome::Delivered(response) => {
                assert_eq!(response.status_code, 500);
                assert!(!response.is_success);
            },
            AttemptOutcome::Failed(e) => panic!("expected delivered outcome, got {e}"),
        }
    }

    #[tokio::test]
    async fn attempt_id_header_added() {
        let mock_server = MockServer::start().await;
        let attempt_id = AttemptId::new();

        Mock::given(matchers::method("POST"))
            .and(matchers::header(ATTEMPT_ID_HEADER, attempt_id.to_string().as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let message = message_to(format!("{}/hook", mock_server.uri()));

        assert!(client.deliver(attempt_id, &message).await.is_ok());
    }

    #[tokio::test]
    async fn relative_target_rejected_without_network_io() {
        let client = DeliveryClient::with_defaults().unwrap();
        let message = message_to("/just/a/path".to_string());

        let result = client.deliver(AttemptId::new(), &message).await;

        assert!(matches!(result, Err(DeliveryError::InvalidTarget { .. })));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = ClientConfig { timeout: Duration::ZERO, ..Default::default() };
        assert!(matches!(
            DeliveryClient::new(config),
            Err(DeliveryError::ConfigurationError { .. })
        ));
    }
}
