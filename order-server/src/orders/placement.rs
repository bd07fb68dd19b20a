//! Order placement orchestration
//!
//! One atomic decision per request:
//!
//! ```text
//! place_order(caller, key, draft)
//!     ├─ 1. Reserve the idempotency key (replay the captured outcome if any)
//!     ├─ 2. Validate and reprice the draft against the menu collaborator
//!     ├─ 3. Persist the PENDING order with its line items
//!     ├─ 4. Initiate payment (bounded retries with backoff and a timeout)
//!     ├─ 5. Success → attach payment, PENDING → ACCEPTED
//!     │    Decline → PENDING → DECLINED
//!     ├─ 6. Commit the final order to the ledger under the key
//!     └─ 7. Return it
//! ```
//!
//! The payment call deliberately happens outside any store transaction; the
//! order is finalized afterwards through compare-and-set transitions, and
//! retries are made safe by the ledger rather than by holding a transaction
//! open across the network.

use crate::common::AppError;
use crate::menu::{MenuError, MenuProvider};
use crate::orders::ledger::{IdempotencyLedger, Reservation};
use crate::orders::money;
use crate::orders::storage::{OrderStorage, Transition};
use crate::payment::{PaymentCoordinator, PaymentError};
use shared::models::MenuItem;
use shared::order::{LineItem, Order, OrderDraft, OrderStatus, Payment, PaymentMethod};
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator knobs, all bounded: nothing here waits forever
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    /// Attempts per dependency call before giving up
    pub dependency_attempts: u32,
    /// Base backoff between attempts, doubled each retry
    pub dependency_backoff: Duration,
    /// Hard ceiling on a single payment initiation
    pub payment_timeout: Duration,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            dependency_attempts: 3,
            dependency_backoff: Duration::from_millis(200),
            payment_timeout: Duration::from_secs(5),
        }
    }
}

enum PaymentOutcome {
    Settled(Payment),
    Declined(String),
}

/// Ties ledger, store, menu and payment into one placement decision
pub struct PlacementService {
    storage: OrderStorage,
    ledger: Arc<IdempotencyLedger>,
    menu: Arc<dyn MenuProvider>,
    payment: Arc<dyn PaymentCoordinator>,
    config: PlacementConfig,
}

impl PlacementService {
    pub fn new(
        storage: OrderStorage,
        ledger: Arc<IdempotencyLedger>,
        menu: Arc<dyn MenuProvider>,
        payment: Arc<dyn PaymentCoordinator>,
        config: PlacementConfig,
    ) -> Self {
        Self {
            storage,
            ledger,
            menu,
            payment,
            config,
        }
    }

    /// Place an order exactly once per `(caller, idempotency key)`.
    ///
    /// Replays return the captured outcome verbatim and perform no side
    /// effects. A declined payment is a normal outcome: the returned order
    /// is `DECLINED`, not an error.
    pub async fn place_order(
        &self,
        caller_id: &str,
        idempotency_key: &str,
        draft: OrderDraft,
    ) -> Result<Order, AppError> {
        if idempotency_key.trim().is_empty() {
            return Err(AppError::Validation(
                "idempotency key must not be empty".into(),
            ));
        }

        match self.ledger.reserve(caller_id, idempotency_key).await? {
            Reservation::Replayed(order) => {
                tracing::info!(
                    caller_id,
                    idempotency_key,
                    order_id = %order.order_id,
                    "replaying captured placement outcome"
                );
                return Ok(order);
            }
            Reservation::Fresh => {}
        }

        // The key is ours now: every path below must commit or release it.
        let order = match self.price_draft(caller_id, idempotency_key, &draft).await {
            Ok(order) => order,
            Err(e) => {
                self.ledger.release(caller_id, idempotency_key);
                return Err(e);
            }
        };

        if let Err(e) = self.storage.create_order(&order) {
            self.ledger.release(caller_id, idempotency_key);
            return Err(e.into());
        }
        tracing::info!(
            caller_id,
            order_id = %order.order_id,
            total = order.total,
            items = order.items.len(),
            "order created"
        );

        let order_id = order.order_id.clone();
        let final_order = match self.settle(order, draft.payment_method).await {
            Ok(order) => order,
            Err(e) => {
                self.abandon(caller_id, idempotency_key, &order_id);
                return Err(e);
            }
        };

        // Commit failures must not release the key: releasing would let a
        // retry re-execute side effects that already happened. The stale
        // reservation TTL is the escape hatch.
        self.ledger.commit(caller_id, idempotency_key, &final_order)?;

        tracing::info!(
            caller_id,
            order_id = %final_order.order_id,
            status = ?final_order.status,
            "placement finished"
        );
        Ok(final_order)
    }

    /// Validate the draft and build a server-priced PENDING order.
    ///
    /// Rejects before any persistence, so the key stays retryable after the
    /// client corrects the draft.
    async fn price_draft(
        &self,
        caller_id: &str,
        idempotency_key: &str,
        draft: &OrderDraft,
    ) -> Result<Order, AppError> {
        if draft.restaurant_id.trim().is_empty() {
            return Err(AppError::Validation("restaurant id must not be empty".into()));
        }
        if draft.delivery_address.trim().is_empty() {
            return Err(AppError::Validation(
                "delivery address must not be empty".into(),
            ));
        }
        if draft.items.is_empty() {
            return Err(AppError::Validation(
                "an order needs at least one line item".into(),
            ));
        }

        let mut items = Vec::with_capacity(draft.items.len());
        for line in &draft.items {
            money::validate_quantity(line.quantity)?;

            let entry = self
                .lookup_menu_item(&draft.restaurant_id, &line.menu_item_id)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!("unknown menu item: {}", line.menu_item_id))
                })?;
            if !entry.is_available {
                return Err(AppError::Validation(format!(
                    "menu item is not available: {}",
                    entry.name
                )));
            }
            money::validate_unit_price(entry.price)?;

            items.push(LineItem {
                menu_item_id: entry.id,
                name: entry.name,
                quantity: line.quantity,
                unit_price: entry.price,
                line_total: money::line_total(entry.price, line.quantity)?,
            });
        }

        let total = money::order_total(&items)?;
        if let Some(client_total) = draft.client_total {
            if (client_total - total).abs() > f64::EPSILON {
                // Client totals are never trusted; note the drift and move on.
                tracing::debug!(
                    caller_id,
                    client_total,
                    server_total = total,
                    "ignoring client-supplied total"
                );
            }
        }

        Ok(Order::new(
            caller_id,
            &draft.restaurant_id,
            items,
            total,
            &draft.delivery_address,
            idempotency_key,
        ))
    }

    /// Menu lookup with bounded retries on transport failure
    async fn lookup_menu_item(
        &self,
        restaurant_id: &str,
        menu_item_id: &str,
    ) -> Result<Option<MenuItem>, AppError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.menu.get_item(restaurant_id, menu_item_id).await {
                Ok(found) => return Ok(found),
                Err(MenuError::Load(e)) => return Err(AppError::Internal(e)),
                Err(MenuError::Unreachable(e)) => {
                    if attempt >= self.config.dependency_attempts {
                        return Err(AppError::TransientDependency(format!(
                            "menu lookup failed after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    let backoff = self.config.dependency_backoff * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        menu_item_id,
                        attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "menu lookup failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Drive the payment step and finalize the order either way
    async fn settle(&self, order: Order, method: PaymentMethod) -> Result<Order, AppError> {
        match self.initiate_payment(&order, method).await {
            PaymentOutcome::Settled(payment) => {
                self.storage
                    .attach_payment(&order.order_id, &payment.payment_id)?;
                match self.storage.transition(
                    &order.order_id,
                    OrderStatus::Pending,
                    OrderStatus::Accepted,
                )? {
                    Transition::Applied(order) => Ok(order),
                    Transition::Conflict { actual } => self.capture_raced(&order.order_id, actual),
                }
            }
            PaymentOutcome::Declined(reason) => {
                tracing::info!(
                    order_id = %order.order_id,
                    reason = %reason,
                    "payment declined, declining order"
                );
                match self.storage.transition(
                    &order.order_id,
                    OrderStatus::Pending,
                    OrderStatus::Declined,
                )? {
                    Transition::Applied(order) => Ok(order),
                    Transition::Conflict { actual } => self.capture_raced(&order.order_id, actual),
                }
            }
        }
    }

    /// A transition on a just-created order lost a race (a very fast
    /// cancellation). Whatever landed first stands; capture it as the
    /// placement outcome.
    fn capture_raced(&self, order_id: &str, actual: OrderStatus) -> Result<Order, AppError> {
        tracing::warn!(
            order_id,
            status = ?actual,
            "order moved before placement finished, capturing current state"
        );
        self.storage
            .get(order_id)?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Payment initiation with bounded retries, backoff and a per-call
    /// timeout. Retry exhaustion and timeouts become declines: an order must
    /// never sit PENDING waiting on a payment reply that will not come.
    async fn initiate_payment(&self, order: &Order, method: PaymentMethod) -> PaymentOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(
                self.config.payment_timeout,
                self.payment.initiate(&order.order_id, order.total, method),
            )
            .await;

            let transient = match result {
                Ok(Ok(payment)) => return PaymentOutcome::Settled(payment),
                Ok(Err(PaymentError::Declined(reason))) => {
                    return PaymentOutcome::Declined(reason);
                }
                Ok(Err(PaymentError::Unreachable(e))) => e,
                Err(_) => format!(
                    "no response within {}ms",
                    self.config.payment_timeout.as_millis()
                ),
            };

            if attempt >= self.config.dependency_attempts {
                tracing::warn!(
                    order_id = %order.order_id,
                    attempts = attempt,
                    error = %transient,
                    "payment initiation retries exhausted, declining"
                );
                return PaymentOutcome::Declined(format!(
                    "payment service unreachable: {}",
                    transient
                ));
            }

            let backoff = self.config.dependency_backoff * 2u32.pow(attempt - 1);
            tracing::warn!(
                order_id = %order.order_id,
                attempt,
                error = %transient,
                backoff_ms = backoff.as_millis() as u64,
                "payment initiation failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Best-effort cleanup after a storage failure mid-placement: never
    /// leave a fresh order stuck PENDING, and free the key for a retry.
    fn abandon(&self, caller_id: &str, idempotency_key: &str, order_id: &str) {
        match self
            .storage
            .transition(order_id, OrderStatus::Pending, OrderStatus::Declined)
        {
            Ok(Transition::Applied(_)) => {
                tracing::info!(order_id, "abandoned order declined");
            }
            Ok(Transition::Conflict { actual }) => {
                tracing::warn!(order_id, status = ?actual, "abandoned order already moved");
            }
            Err(e) => {
                tracing::error!(order_id, error = %e, "failed to decline abandoned order");
            }
        }
        self.ledger.release(caller_id, idempotency_key);
    }
}
