// ============================================================================
// Bridge Shared
// ============================================================================
//
// Everything the two binaries have in common:
//
// - bus, subscriptions:         subject-based message bus and client fan-out
// - keystore, cache, backends:  persistence and backend selection
// - codec, auth, auth_backend:  envelopes, challenges, registration checks
// - cloud, routes, context:     the cloud service
// - relay:                      the on-prem agent
//
// ============================================================================

pub mod auth;
pub mod auth_backend;
pub mod backends;
pub mod bus;
pub mod cache;
pub mod cloud;
pub mod codec;
pub mod context;
pub mod echo;
pub mod keystore;
pub mod relay;
pub mod retry;
pub mod routes;
pub mod subscriptions;

#[cfg(test)]
mod testing;

use bridge_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(config.rust_log.clone());
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
