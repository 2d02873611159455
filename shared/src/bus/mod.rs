// ============================================================================
// Message Bus
// ============================================================================
//
// The bridge consumes a pub/sub bus, it does not implement one. Everything
// the relay and the cloud service need goes through `MessageBus`:
//
// - publish / subscribe with NATS-style wildcards (`*`, `>`)
// - queue groups (each message goes to one member of a group)
// - request/reply via a private `_INBOX.<uuid>` subscription
//
// Backends:
// - memory.rs: in-process bus for tests and single-process deployments
// - redis.rs:  Redis pub/sub with a channel prefix
//
// The bus is always injected as `Arc<dyn MessageBus>`.
// ============================================================================

mod memory;
mod redis;
pub mod subject;

pub use memory::MemoryBus;
pub use self::redis::RedisBus;
pub use subject::{subject_matches, validate_pattern, validate_subject};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_types::{BusMessage, INBOX_PREFIX};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Per-subscription buffer. A subscriber that falls this far behind starts
/// losing messages.
pub const SUBSCRIPTION_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("request timed out")]
    Timeout,

    #[error("subscription closed")]
    Closed,

    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("bus frame error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Pub/sub capability consumed by the relay and the cloud service.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError>;

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError>;

    /// Like `subscribe`, but each message matching `pattern` is delivered to
    /// only one subscription of `group`.
    async fn queue_subscribe(&self, pattern: &str, group: &str) -> Result<Subscription, BusError>;

    /// Publish `message` with a fresh inbox as reply subject and wait for the
    /// first reply.
    async fn request(&self, mut message: BusMessage, timeout: Duration) -> Result<BusMessage, BusError> {
        let inbox = format!("{}{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let replies = self.subscribe(&inbox).await?;
        message.reply_to = Some(inbox);
        self.publish(message).await?;

        let reply = replies.next_message(timeout).await?;
        replies.unsubscribe();
        reply.ok_or(BusError::Timeout)
    }
}

/// Backend hook invoked when a subscription is closed.
pub trait SubscriptionCloser: Send + Sync {
    fn close(&self, id: u64);
}

/// A live subscription. Unsubscribes when dropped.
pub struct Subscription {
    id: u64,
    pattern: String,
    receiver: Mutex<mpsc::Receiver<BusMessage>>,
    closer: Arc<dyn SubscriptionCloser>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        pattern: &str,
        receiver: mpsc::Receiver<BusMessage>,
        closer: Arc<dyn SubscriptionCloser>,
    ) -> Self {
        Self {
            id,
            pattern: pattern.to_string(),
            receiver: Mutex::new(receiver),
            closer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout,
    /// `Err(Closed)` once the subscription is gone.
    pub async fn next_message(&self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(BusError::Closed),
            Err(_) => {
                if self.is_closed() {
                    Err(BusError::Closed)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// A message that is already buffered, without waiting.
    pub fn try_next(&self) -> Option<BusMessage> {
        let mut receiver = self.receiver.try_lock().ok()?;
        receiver.try_recv().ok()
    }

    /// Stop delivery. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.closer.close(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
