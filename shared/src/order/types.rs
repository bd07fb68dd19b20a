//! Order, line item and payment records
//!
//! `Order` is the server-priced record handed back to clients and captured
//! by the idempotency ledger. `OrderDraft` is what clients submit; prices in
//! a draft are advisory at best and are always recomputed server-side.

use super::status::OrderStatus;
use crate::util::{new_id, now_millis};
use serde::{Deserialize, Serialize};

/// Payment method selected at order time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CashOnDelivery,
    Card,
}

/// Payment settlement status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// Payment record, owned by the payment coordinator.
///
/// Orders reference a payment by id only and never embed payment data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub timestamp: i64,
}

impl Payment {
    pub fn new(order_id: impl Into<String>, amount: f64, method: PaymentMethod) -> Self {
        Self {
            payment_id: new_id(),
            order_id: order_id.into(),
            amount,
            method,
            status: PaymentStatus::Pending,
            timestamp: now_millis(),
        }
    }
}

/// One priced line of an order.
///
/// Owned exclusively by its order: created with it, never referenced on its
/// own, and removed only if the order itself is ever removed (orders are
/// normally only transitioned, never deleted). Name and unit price are
/// snapshots taken from the menu at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub menu_item_id: String,
    /// Menu item name at order time
    pub name: String,
    pub quantity: i32,
    /// Unit price at order time
    pub unit_price: f64,
    pub line_total: f64,
}

/// A client-submitted line before validation and repricing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftItem {
    pub menu_item_id: String,
    pub quantity: i32,
}

/// A client-submitted order before validation and repricing.
///
/// `client_total` is whatever the client believes the order costs. It is
/// never trusted: the server recomputes the total from current menu prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDraft {
    pub restaurant_id: String,
    pub items: Vec<DraftItem>,
    pub delivery_address: String,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_total: Option<f64>,
}

/// A placed order.
///
/// Immutable once in a terminal status except for status transitions and
/// one-time payment attachment. `total` always equals the sum of
/// `line_total` over `items`, computed server-side at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Order ID (assigned by server)
    pub order_id: String,
    /// Owning customer
    pub customer_id: String,
    pub restaurant_id: String,
    pub items: Vec<LineItem>,
    /// Server-computed total
    pub total: f64,
    /// Opaque delivery address text
    pub delivery_address: String,
    pub status: OrderStatus,
    /// Linked payment, attached exactly once after successful initiation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Client-chosen key that made this placement idempotent
    pub idempotency_key: String,
    /// Creation timestamp (millis)
    pub created_at: i64,
    /// Last transition timestamp (millis)
    pub updated_at: i64,
}

impl Order {
    /// Create a new `PENDING` order with a fresh server-assigned id.
    pub fn new(
        customer_id: impl Into<String>,
        restaurant_id: impl Into<String>,
        items: Vec<LineItem>,
        total: f64,
        delivery_address: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            order_id: new_id(),
            customer_id: customer_id.into(),
            restaurant_id: restaurant_id.into(),
            items,
            total,
            delivery_address: delivery_address.into(),
            status: OrderStatus::Pending,
            payment_id: None,
            idempotency_key: idempotency_key.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
