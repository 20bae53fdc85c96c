//! Lane pool management with structured concurrency.
//!
//! Spawns the delivery lanes, restarts a lane whose loop panics, and stops
//! them all on shutdown.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use hookrelay_core::EventHandler;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::Forwarder,
    engine::EngineStats,
    error::{DeliveryError, Result},
    queue::QueueReceiver,
    worker::{panic_message, DeliveryLane},
};

/// Pool of supervised delivery lanes.
///
/// Each lane runs inside a supervisor task. A panic that escapes the lane's
/// per-message guard is logged and the lane loop is started again, so a
/// single faulty lane never takes the queue down with it.
pub struct WorkerPool {
    receiver: QueueReceiver,
    worker_count: usize,
    forwarder: Arc<dyn Forwarder>,
    event_handler: Arc<dyn EventHandler>,
    stats: Arc<RwLock<EngineStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Create a new lane pool.
    pub fn new(
        receiver: QueueReceiver,
        worker_count: usize,
        forwarder: Arc<dyn Forwarder>,
        event_handler: Arc<dyn EventHandler>,
        stats: Arc<RwLock<EngineStats>>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            worker_count,
            forwarder,
            event_handler,
            stats,
            cancellation_token,
            worker_handles: Vec::new(),
        }
    }

    /// Spawn all configured lanes and begin processing.
    ///
    /// Returns immediately after spawning.
    ///
    /// # Errors
    ///
    /// Currently never returns error but signature allows for future
    /// validation.
    pub async fn spawn_workers(&mut self) -> Result<()> {
        info!(worker_count = self.worker_count, "spawning delivery lanes");

        self.stats.write().await.active_workers = self.worker_count;

        for lane_id in 0..self.worker_count {
            let lane = DeliveryLane::new(
                lane_id,
                self.receiver.clone(),
                self.forwarder.clone(),
                self.event_handler.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
            );
            let cancellation_token = self.cancellation_token.clone();

            let handle = tokio::spawn(supervise(lane, cancellation_token));
            self.worker_handles.push(handle);
        }

        info!(spawned_workers = self.worker_handles.len(), "all delivery lanes spawned");

        Ok(())
    }

    /// Signals cancellation and waits for every lane to finish its current
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns error if shutdown timeout is exceeded.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_ms = timeout.as_millis(),
            "initiating lane shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let stats = self.stats.clone();

        let shutdown_future = async move {
            let mut error_count = 0_usize;

            for (lane_id, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => {
                        error_count += 1;
                        warn!(lane_id, error = %error, "lane completed with error during shutdown");
                    },
                    Err(join_error) => {
                        error_count += 1;
                        error!(lane_id, error = %join_error, "lane task failed during shutdown");
                    },
                }
            }

            stats.write().await.active_workers = 0;
            error_count
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(error_count) => {
                if error_count > 0 {
                    warn!(error_count, "some lanes completed with errors during shutdown");
                }
                info!("lane pool shutdown completed");
                Ok(())
            },
            Err(_timeout) => {
                error!(
                    timeout_ms = timeout.as_millis(),
                    "lane shutdown timed out, some lanes may still be running"
                );
                Err(DeliveryError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Check if any lanes are still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|h| !h.is_finished())
    }

    /// Number of spawned lanes.
    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }
}

/// Runs a lane, restarting its loop after a panic until cancellation.
async fn supervise(lane: DeliveryLane, cancellation_token: CancellationToken) -> Result<()> {
    let lane_id = lane.id();

    loop {
        match AssertUnwindSafe(lane.run()).catch_unwind().await {
            Ok(result) => {
                if let Err(ref error) = result {
                    error!(lane_id, error = %error, "delivery lane terminated with error");
                } else {
                    info!(lane_id, "delivery lane stopped gracefully");
                }
                return result;
            },
            Err(panic) => {
                let error = panic_message(panic.as_ref());
                if cancellation_token.is_cancelled() {
                    error!(lane_id, error = %error, "delivery lane panicked during shutdown");
                    return Err(DeliveryError::LanePanic { lane_id, error });
                }
                error!(lane_id, error = %error, "delivery lane panicked, restarting");
            },
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active_count = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

        if active_count > 0 && !self.cancellation_token.is_cancelled() {
            error!(
                active_workers = active_count,
                "WorkerPool dropped with active lanes, forcing cancellation"
            );

            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use hookrelay_core::{AttemptId, DeliveryEvent, Message, NoOpEventHandler};

    use super::*;
    use crate::{
        client::{AttemptOutcome, DeliveryResponse},
        queue::{channel, QueueConfig},
    };

    #[derive(Debug, Default)]
    struct CountingForwarder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Forwarder for CountingForwarder {
        async fn forward(&self, _attempt_id: AttemptId, _message: &Message) -> AttemptOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AttemptOutcome::Delivered(DeliveryResponse {
                status_code: 200,
                duration: Duration::from_millis(1),
                is_success: true,
            })
        }
    }

    #[derive(Debug, Default)]
    struct PanickingHandler {
        events: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for PanickingHandler {
        async fn handle_event(&self, _event: DeliveryEvent) {
            if self.events.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("handler exploded on first event");
            }
        }
    }

    fn pool_with(
        worker_count: usize,
        forwarder: Arc<dyn Forwarder>,
        event_handler: Arc<dyn EventHandler>,
    ) -> (WorkerPool, crate::queue::DispatchQueue, Arc<RwLock<EngineStats>>) {
        let (queue, receiver) = channel(&QueueConfig::default());
        let stats = Arc::new(RwLock::new(EngineStats::default()));
        let pool = WorkerPool::new(
            receiver,
            worker_count,
            forwarder,
            event_handler,
            stats.clone(),
            CancellationToken::new(),
        );
        (pool, queue, stats)
    }

    #[tokio::test]
    async fn pool_spawns_configured_number_of_lanes() {
        let (mut pool, _queue, stats) = pool_with(
            4,
            Arc::new(CountingForwarder::default()),
            Arc::new(NoOpEventHandler::new()),
        );

        assert_eq!(pool.worker_count(), 0);
        pool.spawn_workers().await.unwrap();

        assert_eq!(pool.worker_count(), 4);
        assert!(pool.has_active_workers());
        assert_eq!(stats.read().await.active_workers, 4);

        pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stats.read().await.active_workers, 0);
    }

    #[tokio::test]
    async fn shutdown_without_spawn_completes() {
        let (pool, _queue, _stats) = pool_with(
            2,
            Arc::new(CountingForwarder::default()),
            Arc::new(NoOpEventHandler::new()),
        );

        assert!(pool.shutdown_graceful(Duration::from_millis(1)).await.is_ok());
    }

    #[tokio::test]
    async fn lane_restarted_after_escaping_panic() {
        let forwarder = Arc::new(CountingForwarder::default());
        let (mut pool, queue, stats) =
            pool_with(1, forwarder.clone(), Arc::new(PanickingHandler::default()));
        pool.spawn_workers().await.unwrap();

        for n in 0..3 {
            queue.enqueue(Message::new("http://localhost/hook", format!("{n}")).unwrap()).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while forwarder.calls.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("restarted lane should keep consuming the queue");

        assert_eq!(queue.depth(), 0);
        assert!(stats.read().await.events_processed >= 2);

        pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_pool_cancels_lanes() {
        let token = CancellationToken::new();
        let (_queue, receiver) = channel(&QueueConfig::default());

        {
            let mut pool = WorkerPool::new(
                receiver,
                2,
                Arc::new(CountingForwarder::default()),
                Arc::new(NoOpEventHandler::new()),
                Arc::new(RwLock::new(EngineStats::default())),
                token.clone(),
            );
            pool.spawn_workers().await.unwrap();
        }

        assert!(token.is_cancelled(), "Drop should have cancelled the token");
    }
}
