// ============================================================================
// Relay (on-prem agent)
// ============================================================================
//
// Moves bus traffic between the local bus and the cloud service.
//
// - engine.rs:       forwarding rules shared by both transports
// - batch.rs:        size/time bounded outbound batching
// - rest.rs:         batched POST pushes plus a long-poll loop
// - websocket.rs:    one persistent socket
// - rotation.rs:     certificate rotation and the retry-once wrapper
// - http.rs:         typed client for the cloud HTTP API
// - registration.rs: first-start identity bootstrap
//
// The transport is picked once at construction from `BRIDGE_TRANSPORT`.
// ============================================================================

mod batch;
mod engine;
mod http;
mod registration;
mod rest;
mod rotation;
mod websocket;

pub use self::batch::{next_batch, BatchPolicy};
pub use self::engine::RelayCore;
pub use self::http::CloudApi;
pub use self::registration::ensure_registered;
pub use self::rest::RestTransport;
pub use self::rotation::{with_rotation_retry, CertRotator, CertificateRotation};
pub use self::websocket::WebSocketTransport;

use std::sync::Arc;

use async_trait::async_trait;
use bridge_config::{Config, TransportKind};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::ChallengeAuthority;
use crate::bus::{BusError, MessageBus};
use crate::codec::{CodecError, EnvelopeCodec};
use crate::keystore::KeyStore;

/// Outbound queue between the local pumps and the transport.
pub(crate) const OUTBOUND_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("certificate invalid, rotation required")]
    CertificateInvalid,

    #[error("cloud returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("certificate rotation failed: {0}")]
    Rotation(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("message handler already running")]
    AlreadyRunning,

    #[error("message handler not running")]
    NotRunning,
}

/// Strategy seam between the agent and its cloud connection.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Start relaying for `client_id`. Returns once the local subscriptions
    /// are in place.
    async fn start_message_handler(&self, client_id: &str) -> Result<(), TransportError>;

    /// Stop all loops and wait for them to exit.
    async fn stop_message_handler(&self) -> Result<(), TransportError>;
}

/// Dependencies of the relay.
#[derive(Clone)]
pub struct RelayContext {
    pub config: Arc<Config>,
    pub bus: Arc<dyn MessageBus>,
    pub key_store: Arc<dyn KeyStore>,
    pub codec: EnvelopeCodec,
    pub authority: ChallengeAuthority,
    pub api: CloudApi,
}

impl RelayContext {
    pub fn new(
        config: Arc<Config>,
        bus: Arc<dyn MessageBus>,
        key_store: Arc<dyn KeyStore>,
    ) -> Result<Self, TransportError> {
        let api = CloudApi::new(&config.relay)?;
        Ok(Self {
            codec: EnvelopeCodec::new(key_store.clone()),
            authority: ChallengeAuthority::new(key_store.clone(), config.security.challenge_max_age),
            config,
            bus,
            key_store,
            api,
        })
    }
}

pub fn build_transport(ctx: RelayContext) -> Box<dyn RelayTransport> {
    match ctx.config.relay.transport {
        TransportKind::Rest => Box::new(RestTransport::new(ctx)),
        TransportKind::WebSocket => Box::new(WebSocketTransport::new(ctx)),
    }
}

/// Running loops of one started transport.
struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Start/stop bookkeeping shared by both transports.
#[derive(Default)]
pub(crate) struct Lifecycle {
    running: Mutex<Option<Running>>,
}

impl Lifecycle {
    pub(crate) async fn start<F, Fut>(&self, spawn: F) -> Result<(), TransportError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<JoinHandle<()>>, TransportError>>,
    {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(TransportError::AlreadyRunning);
        }
        let cancel = CancellationToken::new();
        let tasks = match spawn(cancel.clone()).await {
            Ok(tasks) => tasks,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };
        *running = Some(Running { cancel, tasks });
        Ok(())
    }

    pub(crate) async fn stop(&self) -> Result<(), TransportError> {
        let running = self.running.lock().await.take();
        let Some(running) = running else {
            return Err(TransportError::NotRunning);
        };
        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Relay task ended abnormally");
            }
        }
        Ok(())
    }
}
