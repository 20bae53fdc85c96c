//! Completion event collection for deterministic assertions.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use hookrelay_core::{DeliveryEvent, EventHandler};
use tokio::sync::{Mutex, Notify};

/// Default timeout for waiting on completion events in tests.
///
/// Generous enough for CI machines with variable timing.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Event handler that stores every completion event it receives.
#[derive(Debug, Default)]
pub struct CollectingEventHandler {
    events: Mutex<Vec<DeliveryEvent>>,
    count: AtomicUsize,
    notify: Notify,
}

impl CollectingEventHandler {
    /// Creates a shared collector.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of events received so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Snapshot of received events in completion order.
    pub async fn events(&self) -> Vec<DeliveryEvent> {
        self.events.lock().await.clone()
    }

    /// Waits until at least `count` events arrived.
    ///
    /// # Panics
    ///
    /// Panics if the events do not arrive within `timeout`, so a stuck
    /// pipeline fails the test instead of hanging it.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<DeliveryEvent> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= count {
                    break;
                }
                notified.await;
            }
        })
        .await;

        if result.is_err() {
            panic!(
                "completion events did not arrive in time. Expected: {}, Actual: {}, Timeout: {:?}",
                count,
                self.count(),
                timeout
            );
        }

        self.events().await
    }
}

#[async_trait]
impl EventHandler for CollectingEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        self.events.lock().await.push(event);
        self.count.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}
