//! Status queries and transitions
//!
//! Reads are ownership-checked snapshot reads; updates go through the
//! store's compare-and-set, so a kitchen advance and a customer cancel
//! racing on the same order produce exactly one winner.

use crate::auth::ensure_owner;
use crate::common::AppError;
use crate::orders::storage::{OrderStorage, Transition};
use shared::order::{Order, OrderStatus};

/// Serves order state to pollers and applies transitions as they occur
pub struct StatusService {
    storage: OrderStorage,
}

impl StatusService {
    pub fn new(storage: OrderStorage) -> Self {
        Self { storage }
    }

    /// Ownership-checked order fetch.
    ///
    /// The guard runs before any order data is returned; non-owners get the
    /// same `Forbidden` no matter what they probe.
    pub fn get_order(&self, caller_id: &str, order_id: &str) -> Result<Order, AppError> {
        let order = self
            .storage
            .get(order_id)?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        ensure_owner(caller_id, &order.customer_id)?;
        Ok(order)
    }

    /// The caller's order history, newest first
    pub fn list_orders(&self, caller_id: &str) -> Result<Vec<Order>, AppError> {
        Ok(self.storage.find_by_customer(caller_id)?)
    }

    /// Collaborator-driven status advance (kitchen accepts, starts cooking,
    /// dispatches, completes; or declines a pending order).
    ///
    /// The expected predecessor is derived from the state machine, so an
    /// advance can never skip a state; a `Conflict` means the order already
    /// moved (for example the customer cancelled first).
    pub fn advance_status(&self, order_id: &str, next: OrderStatus) -> Result<Order, AppError> {
        let expected = OrderStatus::advance_predecessor(next).ok_or_else(|| {
            AppError::Validation(format!(
                "{:?} is not reachable through a status advance",
                next
            ))
        })?;

        match self.storage.transition(order_id, expected, next)? {
            Transition::Applied(order) => {
                tracing::info!(order_id, status = ?next, "order status advanced");
                Ok(order)
            }
            Transition::Conflict { actual } => Err(AppError::Conflict(format!(
                "order is {:?}, expected {:?}",
                actual, expected
            ))),
        }
    }

    /// Customer-initiated cancellation.
    ///
    /// Subject to the same compare-and-set discipline as kitchen advances:
    /// whichever transition lands first wins, and a loser that can no longer
    /// cancel gets a "too late" conflict rather than overwriting state.
    pub fn cancel(&self, caller_id: &str, order_id: &str) -> Result<Order, AppError> {
        let order = self.get_order(caller_id, order_id)?;
        if !order.status.is_cancellable() {
            return Err(AppError::Conflict(format!(
                "too late to cancel: order is {:?}",
                order.status
            )));
        }

        match self
            .storage
            .transition(order_id, order.status, OrderStatus::Cancelled)?
        {
            Transition::Applied(order) => {
                tracing::info!(order_id, caller_id, "order cancelled by customer");
                Ok(order)
            }
            Transition::Conflict { actual } => Err(AppError::Conflict(format!(
                "too late to cancel: order is {:?}",
                actual
            ))),
        }
    }
}
