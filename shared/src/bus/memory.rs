//! In-process message bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bridge_types::BusMessage;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{
    subject_matches, validate_pattern, validate_subject, BusError, MessageBus, Subscription,
    SubscriptionCloser, SUBSCRIPTION_CAPACITY,
};

/// Wildcards, queue groups (round robin) and slow-consumer drops, all in
/// memory. Clones share the same bus.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
    round_robin: AtomicUsize,
}

struct Entry {
    id: u64,
    pattern: String,
    group: Option<String>,
    sender: mpsc::Sender<BusMessage>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions, for tests and health output.
    pub fn subscription_count(&self) -> usize {
        self.inner.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    fn add(&self, pattern: &str, group: Option<&str>) -> Result<Subscription, BusError> {
        validate_pattern(pattern)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CAPACITY);

        let mut entries = self
            .inner
            .entries
            .write()
            .map_err(|_| BusError::Connection("memory bus lock poisoned".into()))?;
        entries.push(Entry {
            id,
            pattern: pattern.to_string(),
            group: group.map(str::to_string),
            sender,
        });
        drop(entries);

        let closer: Arc<dyn SubscriptionCloser> = self.inner.clone();
        Ok(Subscription::new(id, pattern, receiver, closer))
    }
}

impl SubscriptionCloser for Inner {
    fn close(&self, id: u64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.retain(|e| e.id != id);
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        validate_subject(&message.subject)?;

        let mut targets: Vec<mpsc::Sender<BusMessage>> = Vec::new();
        {
            let entries = self
                .inner
                .entries
                .read()
                .map_err(|_| BusError::Connection("memory bus lock poisoned".into()))?;

            let mut groups: HashMap<&str, Vec<&Entry>> = HashMap::new();
            for entry in entries.iter().filter(|e| subject_matches(&e.pattern, &message.subject)) {
                match &entry.group {
                    Some(group) => groups.entry(group.as_str()).or_default().push(entry),
                    None => targets.push(entry.sender.clone()),
                }
            }
            for members in groups.values() {
                let turn = self.inner.round_robin.fetch_add(1, Ordering::Relaxed);
                targets.push(members[turn % members.len()].sender.clone());
            }
        }

        for target in targets {
            match target.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        subject = %message.subject,
                        "Slow consumer, dropping message"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, BusError> {
        self.add(pattern, None)
    }

    async fn queue_subscribe(&self, pattern: &str, group: &str) -> Result<Subscription, BusError> {
        self.add(pattern, Some(group))
    }
}
