//! redb-based storage layer for orders
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `OrderRow` | Order header (status, totals, payment ref) |
//! | `order_items` | `(order_id, seq)` | `LineItem` | Line items, written with their order |
//! | `orders_by_customer` | `(customer_id, order_id)` | `()` | Order history index |
//! | `idempotency` | `(caller_id, key)` | `Order` | Captured placement outcomes |
//!
//! # Durability
//!
//! Commits are persistent as soon as `commit()` returns; the database file is
//! always in a consistent state, so an order header is never visible without
//! its line items.
//!
//! # Concurrency
//!
//! redb serializes write transactions, which makes `transition` a true
//! compare-and-set: the status check and the status write happen inside one
//! exclusive write transaction.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use shared::order::{LineItem, Order, OrderStatus};
use shared::util::now_millis;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Table for order headers: key = order_id, value = JSON-serialized OrderRow
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Table for line items: key = (order_id, seq), value = JSON-serialized LineItem
const ORDER_ITEMS_TABLE: TableDefinition<(&str, u32), &[u8]> = TableDefinition::new("order_items");

/// Table for the customer order-history index: key = (customer_id, order_id)
const ORDERS_BY_CUSTOMER_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("orders_by_customer");

/// Table for captured placement outcomes: key = (caller_id, idempotency_key),
/// value = JSON-serialized Order
const IDEMPOTENCY_TABLE: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("idempotency");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order already exists: {0}")]
    DuplicateOrder(String),

    #[error("Illegal status transition: {from:?} -> {to:?}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Payment already attached to order {0}")]
    PaymentAlreadyAttached(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a compare-and-set status transition
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The expected status matched; the order now carries the new status
    Applied(Order),
    /// The stored status did not match the expected one; nothing changed
    Conflict { actual: OrderStatus },
}

/// Order header as persisted. Line items live in their own table, keyed by
/// `(order_id, seq)`, and are joined back on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderRow {
    order_id: String,
    customer_id: String,
    restaurant_id: String,
    total: f64,
    delivery_address: String,
    status: OrderStatus,
    payment_id: Option<String>,
    idempotency_key: String,
    created_at: i64,
    updated_at: i64,
}

impl OrderRow {
    fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            restaurant_id: order.restaurant_id.clone(),
            total: order.total,
            delivery_address: order.delivery_address.clone(),
            status: order.status,
            payment_id: order.payment_id.clone(),
            idempotency_key: order.idempotency_key.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }

    fn into_order(self, items: Vec<LineItem>) -> Order {
        Order {
            order_id: self.order_id,
            customer_id: self.customer_id,
            restaurant_id: self.restaurant_id,
            items,
            total: self.total,
            delivery_address: self.delivery_address,
            status: self.status,
            payment_id: self.payment_id,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Order storage backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl OrderStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::initialize(Arc::new(db))
    }

    /// Open an in-memory database (tests, ephemeral deployments)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::initialize(Arc::new(db))
    }

    fn initialize(db: Arc<Database>) -> StorageResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_ITEMS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_BY_CUSTOMER_TABLE)?;
            let _ = write_txn.open_table(IDEMPOTENCY_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Shared handle to the underlying database, for stores that own their
    /// own tables on the same file (payments)
    pub fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    // ========== Order Creation ==========

    /// Persist an order and all of its line items as one atomic unit.
    ///
    /// Either the header, every line item and the history index entry land
    /// together, or nothing does.
    pub fn create_order(&self, order: &Order) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut orders = txn.open_table(ORDERS_TABLE)?;
            if orders.get(order.order_id.as_str())?.is_some() {
                return Err(StorageError::DuplicateOrder(order.order_id.clone()));
            }
            let row = serde_json::to_vec(&OrderRow::from_order(order))?;
            orders.insert(order.order_id.as_str(), row.as_slice())?;

            let mut items = txn.open_table(ORDER_ITEMS_TABLE)?;
            for (seq, item) in order.items.iter().enumerate() {
                let value = serde_json::to_vec(item)?;
                items.insert((order.order_id.as_str(), seq as u32), value.as_slice())?;
            }

            let mut index = txn.open_table(ORDERS_BY_CUSTOMER_TABLE)?;
            index.insert((order.customer_id.as_str(), order.order_id.as_str()), ())?;
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Order Reads ==========

    /// Load an order with its line items (consistent snapshot read)
    pub fn get(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;

        let row: OrderRow = match orders.get(order_id)? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => return Ok(None),
        };

        let items_table = read_txn.open_table(ORDER_ITEMS_TABLE)?;
        let items = Self::read_items(&items_table, order_id)?;
        Ok(Some(row.into_order(items)))
    }

    /// All orders belonging to a customer, newest first
    pub fn find_by_customer(&self, customer_id: &str) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ORDERS_BY_CUSTOMER_TABLE)?;

        let mut order_ids: Vec<String> = Vec::new();
        for result in index.range((customer_id, "")..)? {
            let (key, _value) = result?;
            let (cid, oid) = key.value();
            if cid != customer_id {
                break;
            }
            order_ids.push(oid.to_string());
        }

        let orders_table = read_txn.open_table(ORDERS_TABLE)?;
        let items_table = read_txn.open_table(ORDER_ITEMS_TABLE)?;

        let mut orders = Vec::with_capacity(order_ids.len());
        for order_id in &order_ids {
            if let Some(value) = orders_table.get(order_id.as_str())? {
                let row: OrderRow = serde_json::from_slice(value.value())?;
                let items = Self::read_items(&items_table, order_id)?;
                orders.push(row.into_order(items));
            }
        }

        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at));
        Ok(orders)
    }

    fn read_items(
        table: &impl ReadableTable<(&'static str, u32), &'static [u8]>,
        order_id: &str,
    ) -> StorageResult<Vec<LineItem>> {
        let mut items = Vec::new();
        for result in table.range((order_id, 0u32)..=(order_id, u32::MAX))? {
            let (_key, value) = result?;
            let item: LineItem = serde_json::from_slice(value.value())?;
            items.push(item);
        }
        Ok(items)
    }

    // ========== Status Transitions ==========

    /// Compare-and-set status change.
    ///
    /// Fails fast on edges the state machine forbids; reports `Conflict`
    /// when the stored status does not match `expected` (a racing transition
    /// got there first).
    pub fn transition(
        &self,
        order_id: &str,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StorageResult<Transition> {
        if !expected.can_transition_to(next) {
            return Err(StorageError::IllegalTransition {
                from: expected,
                to: next,
            });
        }

        let txn = self.db.begin_write()?;
        let applied = {
            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let mut row: OrderRow = match orders.get(order_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::OrderNotFound(order_id.to_string())),
            };

            if row.status != expected {
                return Ok(Transition::Conflict { actual: row.status });
            }

            row.status = next;
            row.updated_at = now_millis();
            let value = serde_json::to_vec(&row)?;
            orders.insert(order_id, value.as_slice())?;

            let items_table = txn.open_table(ORDER_ITEMS_TABLE)?;
            let items = Self::read_items(&items_table, order_id)?;
            row.into_order(items)
        };
        txn.commit()?;
        Ok(Transition::Applied(applied))
    }

    /// Set the payment reference exactly once
    pub fn attach_payment(&self, order_id: &str, payment_id: &str) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let mut row: OrderRow = match orders.get(order_id)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::OrderNotFound(order_id.to_string())),
            };

            if row.payment_id.is_some() {
                return Err(StorageError::PaymentAlreadyAttached(order_id.to_string()));
            }

            row.payment_id = Some(payment_id.to_string());
            row.updated_at = now_millis();
            let value = serde_json::to_vec(&row)?;
            orders.insert(order_id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Captured Placement Outcomes ==========

    /// Look up the captured outcome for `(caller_id, key)`
    pub fn committed_receipt(
        &self,
        caller_id: &str,
        key: &str,
    ) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(IDEMPOTENCY_TABLE)?;

        match table.get((caller_id, key))? {
            Some(value) => {
                let order: Order = serde_json::from_slice(value.value())?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// Record the captured outcome for `(caller_id, key)`.
    ///
    /// First writer wins: returns `false` and leaves the stored outcome
    /// untouched when a record already exists for the key.
    pub fn record_receipt(
        &self,
        caller_id: &str,
        key: &str,
        order: &Order,
    ) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let fresh = {
            let mut table = txn.open_table(IDEMPOTENCY_TABLE)?;
            if table.get((caller_id, key))?.is_some() {
                false
            } else {
                let value = serde_json::to_vec(order)?;
                table.insert((caller_id, key), value.as_slice())?;
                true
            }
        };
        txn.commit()?;
        Ok(fresh)
    }
}
