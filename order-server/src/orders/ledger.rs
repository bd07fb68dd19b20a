//! Idempotency ledger
//!
//! Maps `{caller, idempotency key}` to the captured outcome of a placement.
//! Exactly one caller per key ever observes `Fresh` and executes side
//! effects; everyone else replays the captured outcome.
//!
//! # Reservation lifecycle
//!
//! ```text
//! reserve(caller, key)
//!     ├─ committed outcome on disk  → Replayed(order)
//!     ├─ key free                   → Fresh (caller must commit or release)
//!     └─ key in flight              → wait (bounded) for the owner
//!             ├─ owner commits      → Replayed(order)
//!             ├─ owner releases     → loop, claim the key
//!             └─ wait times out     → Busy
//! ```
//!
//! In-flight reservations live only in memory; committed outcomes are
//! persisted through the order store, so replays survive restarts. A
//! reservation whose owner died without committing or releasing is taken
//! over once it is older than `stale_after`.

use crate::common::AppError;
use crate::orders::storage::{OrderStorage, StorageError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::order::Order;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("placement for this key is still in flight")]
    Busy,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Busy => AppError::Conflict(
                "a placement with this idempotency key is still in flight, retry shortly".into(),
            ),
            LedgerError::Storage(e) => AppError::Storage(e),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of a reservation attempt
#[derive(Debug)]
pub enum Reservation {
    /// The caller owns the key and must eventually `commit` or `release`
    Fresh,
    /// A previous placement with this key already completed
    Replayed(Order),
}

#[derive(Clone)]
struct InFlight {
    since: i64,
    done: Arc<Notify>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            since: now_millis(),
            done: Arc::new(Notify::new()),
        }
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        now_millis() - self.since >= stale_after.as_millis() as i64
    }
}

/// Idempotency ledger: per-key in-flight reservations plus durable
/// committed outcomes
pub struct IdempotencyLedger {
    storage: OrderStorage,
    in_flight: DashMap<(String, String), InFlight>,
    wait_timeout: Duration,
    stale_after: Duration,
}

impl IdempotencyLedger {
    pub fn new(storage: OrderStorage, wait_timeout: Duration, stale_after: Duration) -> Self {
        Self {
            storage,
            in_flight: DashMap::new(),
            wait_timeout,
            stale_after,
        }
    }

    /// Reserve the key, or replay the captured outcome.
    ///
    /// Concurrent duplicates block up to `wait_timeout` for the first flight
    /// to finish; when the wait runs out they surface `Busy` rather than
    /// executing side effects a second time.
    pub async fn reserve(&self, caller_id: &str, key: &str) -> LedgerResult<Reservation> {
        let map_key = (caller_id.to_string(), key.to_string());
        let deadline = tokio::time::Instant::now() + self.wait_timeout;

        loop {
            if let Some(order) = self.storage.committed_receipt(caller_id, key)? {
                return Ok(Reservation::Replayed(order));
            }

            let waiter = match self.in_flight.entry(map_key.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(InFlight::new());
                    None
                }
                Entry::Occupied(mut entry) => {
                    if entry.get().is_stale(self.stale_after) {
                        // Owner died without committing or releasing; take over.
                        tracing::warn!(
                            caller_id,
                            idempotency_key = key,
                            "taking over stale idempotency reservation"
                        );
                        let old = entry.insert(InFlight::new());
                        old.done.notify_waiters();
                        None
                    } else {
                        Some(entry.get().done.clone())
                    }
                }
            };

            let Some(done) = waiter else {
                // Key claimed. A commit may have landed between the receipt
                // check and the claim; close that window before reporting
                // Fresh, otherwise the same key would execute twice.
                if let Some(order) = self.storage.committed_receipt(caller_id, key)? {
                    self.release(caller_id, key);
                    return Ok(Reservation::Replayed(order));
                }
                return Ok(Reservation::Fresh);
            };

            let notified = done.notified();
            tokio::pin!(notified);
            // Register interest before re-checking, so a notify between the
            // check and the await is not lost.
            notified.as_mut().enable();

            if let Some(order) = self.storage.committed_receipt(caller_id, key)? {
                return Ok(Reservation::Replayed(order));
            }
            if !self.in_flight.contains_key(&map_key) {
                // Owner released between lookup and here.
                continue;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(LedgerError::Busy);
            }
        }
    }

    /// Capture the outcome for the key and wake blocked duplicates.
    ///
    /// First writer wins on disk; a second commit for the same key keeps the
    /// stored outcome and logs, so one key can never yield two results.
    pub fn commit(&self, caller_id: &str, key: &str, order: &Order) -> LedgerResult<()> {
        let fresh = self.storage.record_receipt(caller_id, key, order)?;
        if !fresh {
            tracing::warn!(
                caller_id,
                idempotency_key = key,
                order_id = %order.order_id,
                "outcome already captured for key, keeping the first one"
            );
        }
        self.release(caller_id, key);
        Ok(())
    }

    /// Free the key after a failed placement so a corrected retry can run
    pub fn release(&self, caller_id: &str, key: &str) {
        if let Some((_, flight)) = self
            .in_flight
            .remove(&(caller_id.to_string(), key.to_string()))
        {
            flight.done.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::LineItem;

    fn ledger() -> Arc<IdempotencyLedger> {
        let storage = OrderStorage::open_in_memory().unwrap();
        Arc::new(IdempotencyLedger::new(
            storage,
            Duration::from_millis(500),
            Duration::from_secs(30),
        ))
    }

    fn sample_order(key: &str) -> Order {
        let items = vec![LineItem {
            menu_item_id: "m-1".into(),
            name: "Pad Thai".into(),
            quantity: 1,
            unit_price: 9.0,
            line_total: 9.0,
        }];
        Order::new("c-1", "r-1", items, 9.0, "1 Test Lane", key)
    }

    #[tokio::test]
    async fn fresh_then_replayed_after_commit() {
        let ledger = ledger();

        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));

        let order = sample_order("k-1");
        ledger.commit("c-1", "k-1", &order).unwrap();

        match ledger.reserve("c-1", "k-1").await.unwrap() {
            Reservation::Replayed(replayed) => assert_eq!(replayed.order_id, order.order_id),
            Reservation::Fresh => panic!("expected replay"),
        }
    }

    #[tokio::test]
    async fn released_key_can_be_reserved_again() {
        let ledger = ledger();

        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
        ledger.release("c-1", "k-1");
        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
    }

    #[tokio::test]
    async fn keys_are_scoped_per_caller() {
        let ledger = ledger();

        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
        // Same key from another caller is an independent reservation.
        assert!(matches!(
            ledger.reserve("c-2", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
    }

    #[tokio::test]
    async fn duplicate_in_flight_times_out_as_busy() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let ledger = IdempotencyLedger::new(
            storage,
            Duration::from_millis(50),
            Duration::from_secs(30),
        );

        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
        let err = ledger.reserve("c-1", "k-1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Busy));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_replay_the_winner() {
        let ledger = ledger();

        // Winner holds the reservation.
        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve("c-1", "k-1").await
            }));
        }

        // Let the duplicates block, then commit the outcome.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let order = sample_order("k-1");
        ledger.commit("c-1", "k-1", &order).unwrap();

        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Reservation::Replayed(replayed) => {
                    assert_eq!(replayed.order_id, order.order_id)
                }
                Reservation::Fresh => panic!("duplicate must never observe Fresh"),
            }
        }
    }

    #[tokio::test]
    async fn stale_reservation_is_taken_over() {
        let storage = OrderStorage::open_in_memory().unwrap();
        let ledger = IdempotencyLedger::new(
            storage,
            Duration::from_millis(500),
            Duration::from_millis(0),
        );

        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
        // stale_after of zero: the first reservation is immediately stale.
        assert!(matches!(
            ledger.reserve("c-1", "k-1").await.unwrap(),
            Reservation::Fresh
        ));
    }
}
