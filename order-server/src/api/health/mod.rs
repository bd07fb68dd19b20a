//! Health API Module

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::server::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
