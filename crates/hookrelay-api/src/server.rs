//! HTTP server configuration and request routing.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. CORS handling (permissive)
//! 4. Timeout enforcement (30s, health only; ingest bounds its own body
//!    read so it can still answer 204)
//! 5. Handler execution
//!
//! Termination is driven by the binary: a shutdown signal ends the process
//! without draining the queue.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use hookrelay_delivery::{DispatchQueue, EngineStats};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::handlers;

/// Header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Upper bound on handling one inbound request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every handler.
///
/// Holds the producer side of the dispatch queue; handlers never wait on
/// delivery.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Producer handle for admitted messages.
    pub queue: DispatchQueue,
    /// Engine statistics for health reporting.
    pub stats: Arc<RwLock<EngineStats>>,
    /// Header that names the delivery target.
    pub target_header: HeaderName,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

/// Creates the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use hookrelay_api::{create_router, AppState, Config};
/// use hookrelay_delivery::DeliveryEngine;
///
/// # fn build() -> anyhow::Result<()> {
/// let config = Config::default();
/// let engine = DeliveryEngine::new(config.to_delivery_config())?;
/// let state = AppState {
///     queue: engine.queue(),
///     stats: engine.stats_handle(),
///     target_header: config.target_header_name()?,
///     max_body_bytes: config.max_body_bytes,
/// };
/// let app = create_router(state, &config.ingest_path);
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState, ingest_path: &str) -> Router {
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let ingest_routes = Router::new().route(ingest_path, post(handlers::ingest_message));

    Router::new()
        .merge(health_routes)
        .merge(ingest_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Everything logged while handling the request carries the same id.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Starts the ingress listener and serves until the process exits.
///
/// Serves HTTPS when TLS material is given, plain HTTP otherwise.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound or the listener
/// fails.
pub async fn start_server(
    router: Router,
    addr: SocketAddr,
    tls: Option<RustlsConfig>,
) -> Result<(), std::io::Error> {
    match tls {
        Some(tls_config) => {
            info!("Starting HTTPS server on {}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(router.into_make_service()).await?;
        },
        None => {
            warn!("No TLS material configured, serving plain HTTP");
            let listener = TcpListener::bind(addr).await?;
            serve(listener, router).await?;
        },
    }

    info!("HTTP server stopped");
    Ok(())
}

/// Serves plain HTTP on an already bound listener.
///
/// # Errors
///
/// Returns `std::io::Error` if the listener fails.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    let actual_addr = listener.local_addr()?;
    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, router).await
}

/// Waits for a termination signal (CTRL+C or SIGTERM).
///
/// Returns the name of the signal received.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
