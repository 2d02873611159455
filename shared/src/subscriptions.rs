// ============================================================================
// Client Subscription Manager
// ============================================================================
//
// Owns one queue-grouped bus subscription per registered client on
// `<client_prefix>.<id>.>`. The subscription is where traffic addressed to
// that client collects until a pull or WebSocket drains it.
//
// Lifecycle events drive the map:
// - client.added    -> open the subscription
// - client.removed  -> unsubscribe and forget it
// - account.removed -> delete the key record, then publish client.removed
//
// The map sits behind one RwLock that is never held across a bus call.
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_config::SubjectConfig;
use bridge_types::{BusMessage, LifecycleEvent, LocationId};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusError, MessageBus, Subscription};
use crate::keystore::KeyStore;

const LISTEN_WAKEUP: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Added,
    Removed,
    AccountRemoved,
}

pub struct SubscriptionManager {
    bus: Arc<dyn MessageBus>,
    key_store: Arc<dyn KeyStore>,
    subjects: SubjectConfig,
    cloud_id: String,
    subscriptions: RwLock<HashMap<String, Arc<Subscription>>>,
}

impl SubscriptionManager {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        key_store: Arc<dyn KeyStore>,
        subjects: SubjectConfig,
        cloud_id: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            key_store,
            subjects,
            cloud_id: cloud_id.into(),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to lifecycle events, then open a subscription for every
    /// client already in the key store. Listener tasks stop on `cancel`.
    pub async fn start(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let added = self.bus.subscribe(&self.subjects.client_added()).await?;
        let removed = self.bus.subscribe(&self.subjects.client_removed()).await?;
        let account_removed = self
            .bus
            .queue_subscribe(&self.subjects.account_removed(), &self.subjects.queue_group)
            .await?;

        let ids = self.key_store.list_ids().await?;
        let mut opened = 0usize;
        for id in ids.iter().filter(|id| **id != self.cloud_id) {
            match self.add_client(id).await {
                Ok(_) => opened += 1,
                Err(e) => tracing::warn!(location_id = %id, error = %e, "Failed to open client subscription"),
            }
        }
        tracing::info!(clients = opened, "Client subscriptions restored");

        Ok(vec![
            self.spawn_listener(added, Lifecycle::Added, cancel.clone()),
            self.spawn_listener(removed, Lifecycle::Removed, cancel.clone()),
            self.spawn_listener(account_removed, Lifecycle::AccountRemoved, cancel),
        ])
    }

    fn spawn_listener(
        self: &Arc<Self>,
        subscription: Subscription,
        kind: Lifecycle,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = subscription.next_message(LISTEN_WAKEUP) => next,
                };
                match next {
                    Ok(Some(message)) => manager.handle_event(kind, &message).await,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!(subject = %subscription.pattern(), error = %e, "Lifecycle listener stopped");
                        break;
                    }
                }
            }
        })
    }

    async fn handle_event(&self, kind: Lifecycle, message: &BusMessage) {
        let event: LifecycleEvent = match serde_json::from_slice(&message.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(subject = %message.subject, error = %e, "Malformed lifecycle event");
                return;
            }
        };
        let id = event.location_id;
        if LocationId::parse(&id).is_err() || id == self.cloud_id {
            tracing::warn!(location_id = %id, "Ignoring lifecycle event for invalid location");
            return;
        }

        match kind {
            Lifecycle::Added => {
                if let Err(e) = self.add_client(&id).await {
                    tracing::warn!(location_id = %id, error = %e, "Failed to open client subscription");
                }
            }
            Lifecycle::Removed => {
                self.remove_client(&id).await;
            }
            Lifecycle::AccountRemoved => {
                if let Err(e) = self.remove_account(&id).await {
                    tracing::warn!(location_id = %id, error = %e, "Failed to remove account");
                }
            }
        }
    }

    /// Open the client's subscription. Idempotent.
    pub async fn add_client(&self, id: &str) -> Result<Arc<Subscription>, BusError> {
        if let Some(existing) = self.subscription_for_client(id).await {
            return Ok(existing);
        }

        let subscription = self
            .bus
            .queue_subscribe(&self.subjects.client_pattern(id), &self.subjects.queue_group)
            .await?;
        let subscription = Arc::new(subscription);

        let mut map = self.subscriptions.write().await;
        if let Some(existing) = map.get(id) {
            // Lost a race with a concurrent add; ours unsubscribes on drop
            return Ok(Arc::clone(existing));
        }
        map.insert(id.to_string(), Arc::clone(&subscription));
        drop(map);

        tracing::info!(location_id = %id, "Client subscription opened");
        Ok(subscription)
    }

    /// True when a subscription existed.
    pub async fn remove_client(&self, id: &str) -> bool {
        let removed = self.subscriptions.write().await.remove(id);
        match removed {
            Some(subscription) => {
                subscription.unsubscribe();
                tracing::info!(location_id = %id, "Client subscription closed");
                true
            }
            None => false,
        }
    }

    pub async fn remove_account(&self, id: &str) -> anyhow::Result<()> {
        let deleted = self.key_store.delete(id).await?;
        tracing::info!(location_id = %id, deleted, "Account removed");

        publish_lifecycle(self.bus.as_ref(), self.subjects.client_removed(), id).await?;
        Ok(())
    }

    pub async fn subscription_for_client(&self, id: &str) -> Option<Arc<Subscription>> {
        self.subscriptions.read().await.get(id).cloned()
    }

    pub async fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscriptions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Publish a lifecycle event for `id` on `subject`.
pub async fn publish_lifecycle(
    bus: &dyn MessageBus,
    subject: String,
    id: &str,
) -> Result<(), BusError> {
    let event = serde_json::to_vec(&LifecycleEvent {
        location_id: id.to_string(),
    })?;
    bus.publish(BusMessage::new(subject, event)).await
}
