//! Payment coordination
//!
//! The coordinator is the only writer of payment records; orders reference a
//! payment by id and never embed payment data. Business declines and
//! transport failures are distinct: only the latter are worth retrying.

use crate::orders::storage::{StorageError, StorageResult};
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::order::{Payment, PaymentMethod, PaymentStatus};
use std::sync::Arc;
use thiserror::Error;

/// Table for payment records: key = payment_id, value = JSON-serialized Payment
const PAYMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");

/// Table for the order → payments index: key = (order_id, payment_id)
const PAYMENTS_BY_ORDER_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("payments_by_order");

/// Payment initiation errors
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The payment itself was refused; retrying the same request is pointless
    #[error("payment declined: {0}")]
    Declined(String),

    /// The payment collaborator could not be reached; safe to retry
    #[error("payment service unreachable: {0}")]
    Unreachable(String),
}

/// Issues a payment request for an order and records the outcome
#[async_trait]
pub trait PaymentCoordinator: Send + Sync {
    async fn initiate(
        &self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError>;
}

/// Durable payment record store.
///
/// Owns its tables on the shared database file; nothing outside this module
/// writes them.
#[derive(Clone)]
pub struct PaymentStore {
    db: Arc<Database>,
}

impl PaymentStore {
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PAYMENTS_TABLE)?;
            let _ = write_txn.open_table(PAYMENTS_BY_ORDER_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Persist a payment record and its order index entry
    pub fn record(&self, payment: &Payment) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut payments = txn.open_table(PAYMENTS_TABLE)?;
            let value = serde_json::to_vec(payment)?;
            payments.insert(payment.payment_id.as_str(), value.as_slice())?;

            let mut index = txn.open_table(PAYMENTS_BY_ORDER_TABLE)?;
            index.insert(
                (payment.order_id.as_str(), payment.payment_id.as_str()),
                (),
            )?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, payment_id: &str) -> StorageResult<Option<Payment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PAYMENTS_TABLE)?;

        match table.get(payment_id)? {
            Some(value) => {
                let payment: Payment = serde_json::from_slice(value.value())?;
                Ok(Some(payment))
            }
            None => Ok(None),
        }
    }

    /// All payment records for an order, oldest first
    pub fn list_by_order(&self, order_id: &str) -> StorageResult<Vec<Payment>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(PAYMENTS_BY_ORDER_TABLE)?;
        let payments_table = read_txn.open_table(PAYMENTS_TABLE)?;

        let mut payments = Vec::new();
        for result in index.range((order_id, "")..)? {
            let (key, _value) = result?;
            let (oid, pid) = key.value();
            if oid != order_id {
                break;
            }
            if let Some(value) = payments_table.get(pid)? {
                let payment: Payment = serde_json::from_slice(value.value())?;
                payments.push(payment);
            }
        }

        payments.sort_by_key(|p| p.timestamp);
        Ok(payments)
    }
}

/// Coordinator for methods that settle at order time.
///
/// Cash-on-delivery and card-at-counter have no asynchronous leg in this
/// domain: a successful initiation is a settled payment. Methods with an
/// asynchronous settlement would start `Pending` and be resolved by a
/// callback at this boundary.
pub struct DirectPaymentCoordinator {
    store: PaymentStore,
}

impl DirectPaymentCoordinator {
    pub fn new(store: PaymentStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PaymentCoordinator for DirectPaymentCoordinator {
    async fn initiate(
        &self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(PaymentError::Declined(format!(
                "invalid amount: {}",
                amount
            )));
        }

        let mut payment = Payment::new(order_id, amount, method);
        payment.status = PaymentStatus::Success;

        self.store
            .record(&payment)
            .map_err(|e: StorageError| PaymentError::Unreachable(e.to_string()))?;

        tracing::debug!(
            payment_id = %payment.payment_id,
            order_id,
            amount,
            method = ?method,
            "payment settled"
        );
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::storage::OrderStorage;

    fn store() -> PaymentStore {
        let storage = OrderStorage::open_in_memory().unwrap();
        PaymentStore::new(storage.database()).unwrap()
    }

    #[tokio::test]
    async fn direct_coordinator_settles_and_records() {
        let store = store();
        let coordinator = DirectPaymentCoordinator::new(store.clone());

        let payment = coordinator
            .initiate("o-1", 13.5, PaymentMethod::CashOnDelivery)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.amount, 13.5);

        let stored = store.get(&payment.payment_id).unwrap().unwrap();
        assert_eq!(stored, payment);
        assert_eq!(store.list_by_order("o-1").unwrap().len(), 1);
        assert!(store.list_by_order("o-2").unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_positive_amounts_are_declined() {
        let coordinator = DirectPaymentCoordinator::new(store());

        let err = coordinator
            .initiate("o-1", 0.0, PaymentMethod::Card)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
    }
}
