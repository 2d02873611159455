// ============================================================================
// Test Utilities for the Bridge
// ============================================================================
//
// Spawns a cloud service on 127.0.0.1:0 backed by an in-process bus and
// in-memory stores, plus on-prem agents with their own local bus. The cloud
// bus carries two responders:
// - the auth backend, accepting `VALID_SECRET` only
// - an echo handler on `svc.echo` that appends " | handler"
//
// ============================================================================

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bridge_config::{Config, TransportKind};
use bridge_shared::bus::{MemoryBus, MessageBus};
use bridge_shared::cache::MemoryMessageCache;
use bridge_shared::cloud::{self, ensure_cloud_identity};
use bridge_shared::context::AppContext;
use bridge_shared::keystore::{KeyStore, MemoryKeyStore};
use bridge_shared::relay::{build_transport, ensure_registered, RelayContext, RelayTransport};
use bridge_shared::routes::create_router;
use bridge_types::{AuthBackendReply, AuthBackendRequest, BusMessage};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const VALID_SECRET: &str = "let-me-in";
pub const ECHO_SUBJECT: &str = "svc.echo";
pub const KEY_BITS: usize = 1024;

const RESPONDER_WAKEUP: Duration = Duration::from_millis(200);

/// Running cloud service.
pub struct CloudApp {
    pub address: String,
    pub base_url: String,
    pub bus: MemoryBus,
    pub key_store: Arc<dyn KeyStore>,
    pub context: Arc<AppContext>,
    pub cancel: CancellationToken,
}

impl Drop for CloudApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Registered agent. Not relaying until `start` is called.
pub struct Agent {
    pub location_id: String,
    pub bus: MemoryBus,
    pub key_store: Arc<dyn KeyStore>,
    pub transport: Box<dyn RelayTransport>,
}

impl Agent {
    pub async fn start(&self) {
        self.transport
            .start_message_handler(&self.location_id)
            .await
            .unwrap();
    }

    pub async fn stop(&self) {
        self.transport.stop_message_handler().await.unwrap();
    }

    /// Publish `payload` on the echo subject and wait for the answer on
    /// `reply_subject`.
    pub async fn echo(&self, payload: &str, reply_subject: &str) -> Option<BusMessage> {
        let replies = self.bus.subscribe(reply_subject).await.unwrap();
        self.bus
            .publish(BusMessage::new(ECHO_SUBJECT, payload).with_reply_to(reply_subject))
            .await
            .unwrap();
        replies.next_message(Duration::from_secs(15)).await.unwrap()
    }
}

pub fn cloud_config() -> Config {
    let mut config = Config::default();
    config.security.key_bits = KEY_BITS;
    config.server.default_poll_timeout = Duration::from_secs(1);
    config.server.max_poll_timeout = Duration::from_secs(2);
    config.registration.auth_timeout = Duration::from_secs(5);
    config.bus.request_timeout = Duration::from_secs(5);
    config
}

pub fn agent_config(cloud: &CloudApp, transport: TransportKind) -> Config {
    let mut config = Config::default();
    config.security.key_bits = KEY_BITS;
    config.relay.transport = transport;
    config.relay.server_url = cloud.base_url.clone();
    config.relay.poll_timeout = Duration::from_secs(1);
    config.relay.reconnect_initial_backoff = Duration::from_millis(50);
    config.relay.reconnect_max_backoff = Duration::from_millis(500);
    config.registration.prem_id = "plant-1".to_string();
    config.registration.user_id = "operator".to_string();
    config.registration.secret = VALID_SECRET.to_string();
    config.bus.request_timeout = Duration::from_secs(5);
    config
}

pub async fn spawn_cloud() -> CloudApp {
    spawn_cloud_with(cloud_config()).await
}

pub async fn spawn_cloud_with(config: Config) -> CloudApp {
    let config = Arc::new(config);
    let bus = MemoryBus::new();
    let key_store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());

    ensure_cloud_identity(key_store.as_ref(), &config.cloud_id, config.security.key_bits)
        .await
        .unwrap();

    let context = Arc::new(AppContext::new(
        config.clone(),
        Arc::new(bus.clone()),
        key_store.clone(),
        Arc::new(MemoryMessageCache::new()),
    ));

    let cancel = CancellationToken::new();
    cloud::start(&context, cancel.clone()).await.unwrap();
    spawn_auth_responder(&bus, &config.subjects.auth_subject, cancel.clone()).await;
    spawn_echo_handler(&bus, cancel.clone()).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let app = create_router(context.clone());
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    CloudApp {
        base_url: format!("http://{}", address),
        address,
        bus,
        key_store,
        context,
        cancel,
    }
}

/// Register a new agent against `cloud`.
pub async fn register_agent(config: Config) -> anyhow::Result<Agent> {
    let bus = MemoryBus::new();
    let key_store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
    let ctx = RelayContext::new(Arc::new(config), Arc::new(bus.clone()), key_store.clone())?;
    let location_id = ensure_registered(&ctx).await?;
    Ok(Agent {
        location_id,
        bus,
        key_store,
        transport: build_transport(ctx),
    })
}

async fn spawn_auth_responder(bus: &MemoryBus, subject: &str, cancel: CancellationToken) {
    let requests = bus.subscribe(subject).await.unwrap();
    let bus = bus.clone();
    tokio::spawn(async move {
        while !cancel.is_cancelled() {
            let message = match requests.next_message(RESPONDER_WAKEUP).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(_) => break,
            };
            let Some(reply_to) = message.reply_to.clone() else {
                continue;
            };
            let request: AuthBackendRequest = serde_json::from_slice(&message.data).unwrap();
            let reply = if request.secret == VALID_SECRET {
                AuthBackendReply {
                    valid: true,
                    reason: None,
                }
            } else {
                AuthBackendReply {
                    valid: false,
                    reason: Some("bad secret".to_string()),
                }
            };
            let body = serde_json::to_vec(&reply).unwrap();
            let _ = bus.publish(BusMessage::new(reply_to, body)).await;
        }
    });
}

async fn spawn_echo_handler(bus: &MemoryBus, cancel: CancellationToken) {
    let requests = bus.subscribe(ECHO_SUBJECT).await.unwrap();
    let bus = bus.clone();
    tokio::spawn(async move {
        while !cancel.is_cancelled() {
            let message = match requests.next_message(RESPONDER_WAKEUP).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(_) => break,
            };
            let Some(reply_to) = message.reply_to.clone() else {
                continue;
            };
            let mut data = message.data.clone();
            data.extend_from_slice(b" | handler");
            let _ = bus.publish(BusMessage::new(reply_to, data)).await;
        }
    });
}

/// Poll `check` until it holds, panicking after about five seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..250 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}
