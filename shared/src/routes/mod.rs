// ============================================================================
// Cloud HTTP Routes
// ============================================================================
//
// Structure:
// - mod.rs:        router assembly and middleware
// - health.rs:     liveness
// - register.rs:   first-contact registration
// - rotate.rs:     certificate rotation
// - messages.rs:   REST push and long-poll pull
// - websocket.rs:  persistent message-queue socket
// - extractors.rs: location and challenge header extraction
//
// Privileged endpoints (pull, push, socket upgrade) run the full gate,
// rotation included. The rotation endpoint only checks the challenge.
// ============================================================================

pub mod extractors;
mod health;
mod messages;
mod register;
mod rotate;
mod websocket;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use bridge_config::MAX_REQUEST_BODY_SIZE;
use bridge_types::{HEALTH_PATH, MESSAGE_QUEUE_PATH, MESSAGE_QUEUE_WS_PATH, REGISTER_PATH, ROTATE_PATH};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

/// Create the cloud service router
pub fn create_router(app_context: Arc<AppContext>) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health::health_check))
        .route(REGISTER_PATH, post(register::register))
        .route(ROTATE_PATH, post(rotate::rotate_certificate))
        .route(
            MESSAGE_QUEUE_PATH,
            get(messages::pull_messages).post(messages::push_messages),
        )
        .route(MESSAGE_QUEUE_WS_PATH, get(websocket::message_queue_socket))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_context)
}
