//! Delivery engine wiring the queue, forwarder and lanes together.
//!
//! The engine is constructed once at startup and hands out `DispatchQueue`
//! clones to producers. Nothing here is global: tests build their own engine
//! around a fake forwarder.

use std::{sync::Arc, time::Duration};

use hookrelay_core::{EventHandler, NoOpEventHandler};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    client::{ClientConfig, DeliveryClient, Forwarder},
    error::{DeliveryError, Result},
    queue::{self, DispatchQueue, QueueConfig, QueueReceiver},
    worker_pool::WorkerPool,
};

/// Configuration for the delivery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Number of concurrent delivery lanes.
    pub worker_count: usize,

    /// Queue admission limits.
    pub queue: QueueConfig,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Maximum time to wait for lanes to stop.
    pub shutdown_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            worker_count: crate::DEFAULT_WORKER_COUNT,
            queue: QueueConfig::default(),
            client_config: ClientConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Statistics for delivery engine monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Number of running lanes.
    pub active_workers: usize,
    /// Messages waiting in the queue.
    pub queue_depth: usize,
    /// Attempts currently being processed.
    pub in_flight_deliveries: u64,
    /// Messages taken off the queue since startup.
    pub events_processed: u64,
    /// Attempts that received a response.
    pub successful_deliveries: u64,
    /// Attempts that ended without a response.
    pub failed_deliveries: u64,
    /// Malformed messages dropped at dequeue.
    pub discarded_messages: u64,
    /// Messages refused by the queue depth limit.
    pub rejected_messages: u64,
}

/// Main delivery engine coordinating the dispatch queue and its lanes.
pub struct DeliveryEngine {
    config: DeliveryConfig,
    queue: DispatchQueue,
    receiver: QueueReceiver,
    forwarder: Arc<dyn Forwarder>,
    event_handler: Arc<dyn EventHandler>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_pool: Option<WorkerPool>,
}

impl DeliveryEngine {
    /// Creates an engine delivering over HTTP with the configured client.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        let client = DeliveryClient::new(config.client_config.clone())?;
        Self::with_forwarder(config, Arc::new(client), Arc::new(NoOpEventHandler::new()))
    }

    /// Creates an engine around any forwarder and completion handler.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if `worker_count` is zero.
    pub fn with_forwarder(
        config: DeliveryConfig,
        forwarder: Arc<dyn Forwarder>,
        event_handler: Arc<dyn EventHandler>,
    ) -> Result<Self> {
        if config.worker_count == 0 {
            return Err(DeliveryError::configuration("worker_count must be greater than 0"));
        }

        let (queue, receiver) = queue::channel(&config.queue);

        Ok(Self {
            config,
            queue,
            receiver,
            forwarder,
            event_handler,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            cancellation_token: CancellationToken::new(),
            worker_pool: None,
        })
    }

    /// Producer handle for enqueuing messages.
    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    /// Engine configuration.
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Spawns the configured number of lanes.
    ///
    /// Returns immediately after spawning. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the lane pool fails to spawn.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker_pool.is_some() {
            return Ok(());
        }

        info!(
            worker_count = self.config.worker_count,
            max_queue_depth = ?self.config.queue.max_depth,
            timeout_ms = self.config.client_config.timeout.as_millis(),
            "starting delivery engine"
        );

        let mut worker_pool = WorkerPool::new(
            self.receiver.clone(),
            self.config.worker_count,
            self.forwarder.clone(),
            self.event_handler.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
        );

        worker_pool.spawn_workers().await?;
        self.worker_pool = Some(worker_pool);

        info!("delivery engine started successfully");
        Ok(())
    }

    /// Stops admission and the lanes.
    ///
    /// Queued messages that no lane has taken are dropped; an attempt already
    /// in flight is allowed to finish within the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Returns error if lanes do not stop within the shutdown timeout.
    pub async fn shutdown(mut self) -> Result<()> {
        info!(queued = self.queue.depth(), "shutting down delivery engine");

        self.receiver.close().await;

        if let Some(worker_pool) = self.worker_pool.take() {
            worker_pool.shutdown_graceful(self.config.shutdown_timeout).await?;
        } else {
            info!("delivery engine was not started, shutdown completed immediately");
        }
        Ok(())
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        let mut stats = self.stats.read().await.clone();
        stats.queue_depth = self.queue.depth();
        stats.rejected_messages = self.queue.rejected();
        stats
    }

    /// Shared statistics handle, for health reporting.
    pub fn stats_handle(&self) -> Arc<RwLock<EngineStats>> {
        self.stats.clone()
    }
}
