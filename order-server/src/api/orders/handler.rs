//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::order::{Order, OrderDraft};

use crate::auth::CallerIdentity;
use crate::common::AppResult;
use crate::server::ServerState;

/// Body of a placement request: the client-generated idempotency key plus
/// the draft itself
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub idempotency_key: String,
    #[serde(flatten)]
    pub draft: OrderDraft,
}

/// Place an order. Retrying with the same idempotency key returns the
/// captured outcome of the first attempt.
pub async fn place(
    State(state): State<ServerState>,
    caller: CallerIdentity,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .placement()
        .place_order(&caller.caller_id, &payload.idempotency_key, payload.draft)
        .await?;
    Ok(Json(order))
}

/// The caller's order history, newest first
pub async fn list(
    State(state): State<ServerState>,
    caller: CallerIdentity,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state.status().list_orders(&caller.caller_id)?;
    Ok(Json(orders))
}

/// Get order by id (owner only)
pub async fn get_by_id(
    State(state): State<ServerState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.status().get_order(&caller.caller_id, &id)?;
    Ok(Json(order))
}

/// Cancel an order while it is still cancellable
pub async fn cancel(
    State(state): State<ServerState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.status().cancel(&caller.caller_id, &id)?;
    Ok(Json(order))
}
