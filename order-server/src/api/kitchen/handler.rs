//! Kitchen API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::order::{Order, OrderStatus};

use crate::auth::InternalCaller;
use crate::common::AppResult;
use crate::server::ServerState;

#[derive(Debug, Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

/// Advance an order along the status chain.
///
/// The expected predecessor is derived server-side; a conflict means the
/// order already moved (for example the customer cancelled first).
pub async fn advance(
    State(state): State<ServerState>,
    _caller: InternalCaller,
    Path(id): Path<String>,
    Json(payload): Json<AdvanceStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state.status().advance_status(&id, payload.status)?;
    Ok(Json(order))
}
