use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::context::AppContext;

pub async fn health_check(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let clients = ctx.subscriptions.client_ids().await.len();
    Json(json!({
        "status": "ok",
        "cloudID": ctx.cloud_id(),
        "clients": clients,
    }))
}
