//! FIFO dispatch queue shared by the delivery lanes.
//!
//! Producers hold cheap `DispatchQueue` clones; lanes share one
//! `QueueReceiver`. The receiver lock is held only while waiting for the next
//! message, so lanes dequeue in arrival order and never block each other
//! during delivery. Closing never takes that lock; a lane parked on it is
//! woken instead.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use hookrelay_core::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{DeliveryError, Result};

/// Admission limits for the queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of waiting messages.
    ///
    /// `None` keeps the queue unbounded. When set, new messages beyond the
    /// limit are rejected and the ones already waiting are kept.
    pub max_depth: Option<usize>,
}

#[derive(Debug, Default)]
struct QueueState {
    depth: AtomicUsize,
    rejected: AtomicU64,
    closed: CancellationToken,
}

/// Producer handle for the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Message>,
    state: Arc<QueueState>,
    max_depth: Option<usize>,
}

/// Consumer side of the dispatch queue, shared by all lanes.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    state: Arc<QueueState>,
}

/// Creates a connected queue and receiver.
pub fn channel(config: &QueueConfig) -> (DispatchQueue, QueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let state = Arc::new(QueueState::default());

    let queue = DispatchQueue { sender, state: state.clone(), max_depth: config.max_depth };
    let receiver = QueueReceiver { receiver: Arc::new(Mutex::new(receiver)), state };

    (queue, receiver)
}

impl DispatchQueue {
    /// Appends a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::QueueFull` when a depth limit is configured
    /// and reached, and `DeliveryError::QueueClosed` after shutdown. An
    /// unbounded queue that is running always accepts.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        if self.state.closed.is_cancelled() {
            return Err(DeliveryError::QueueClosed);
        }

        match self.max_depth {
            Some(max_depth) => {
                let admitted = self.state.depth.fetch_update(
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    |depth| (depth < max_depth).then_some(depth + 1),
                );
                if admitted.is_err() {
                    self.state.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(max_depth, target = %message.target, "queue full, rejecting message");
                    return Err(DeliveryError::QueueFull { max_depth });
                }
            },
            None => {
                self.state.depth.fetch_add(1, Ordering::SeqCst);
            },
        }

        if self.sender.send(message).is_err() {
            self.state.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(DeliveryError::QueueClosed);
        }

        Ok(())
    }

    /// Messages waiting for a lane.
    pub fn depth(&self) -> usize {
        self.state.depth.load(Ordering::SeqCst)
    }

    /// Messages refused because of the depth limit.
    pub fn rejected(&self) -> u64 {
        self.state.rejected.load(Ordering::Relaxed)
    }

    /// Whether the consumer side has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.closed.is_cancelled() || self.sender.is_closed()
    }
}

impl QueueReceiver {
    /// Waits for the next message in FIFO order.
    ///
    /// Returns `None` once the queue is closed and drained. Cancel-safe: a
    /// dropped call never loses a message.
    pub async fn recv(&self) -> Option<Message> {
        let mut receiver = self.receiver.lock().await;
        let message = tokio::select! {
            biased;
            message = receiver.recv() => message,
            () = self.state.closed.cancelled() => {
                receiver.close();
                receiver.recv().await
            }
        };
        drop(receiver);

        if message.is_some() {
            self.state.depth.fetch_sub(1, Ordering::SeqCst);
        }
        message
    }

    /// Stops admission. Messages already queued can still be received.
    ///
    /// Returns without waiting for a lane that is parked in `recv`.
    pub async fn close(&self) {
        self.state.closed.cancel();
        if let Ok(mut receiver) = self.receiver.try_lock() {
            receiver.close();
        }
    }

    /// Messages waiting for a lane.
    pub fn depth(&self) -> usize {
        self.state.depth.load(Ordering::SeqCst)
    }
}
