//! Placement flow tests
//!
//! Exercises the orchestrator end to end against in-memory storage, a seeded
//! menu catalog and scripted payment coordinators: idempotent replays,
//! server-side pricing, declines and bounded retries.

use async_trait::async_trait;
use order_server::menu::{MenuCatalog, MenuProvider};
use order_server::orders::{
    IdempotencyLedger, OrderStorage, PlacementConfig, PlacementService,
};
use order_server::payment::{
    DirectPaymentCoordinator, PaymentCoordinator, PaymentError, PaymentStore,
};
use shared::models::MenuItem;
use shared::order::{DraftItem, OrderDraft, OrderStatus, Payment, PaymentMethod, PaymentStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// ========================================================================
// Helpers
// ========================================================================

fn menu_entry(id: &str, name: &str, price: f64, available: bool) -> MenuItem {
    MenuItem {
        id: id.into(),
        restaurant_id: "r-1".into(),
        name: name.into(),
        price,
        is_available: available,
    }
}

fn seeded_menu() -> Arc<MenuCatalog> {
    let catalog = MenuCatalog::new();
    catalog.upsert(menu_entry("item-a", "Item A", 5.0, true));
    catalog.upsert(menu_entry("item-b", "Item B", 3.5, true));
    catalog.upsert(menu_entry("item-off", "Off Menu", 4.0, false));
    Arc::new(catalog)
}

fn test_config() -> PlacementConfig {
    PlacementConfig {
        dependency_attempts: 3,
        dependency_backoff: Duration::from_millis(10),
        payment_timeout: Duration::from_millis(500),
    }
}

struct Harness {
    storage: OrderStorage,
    payments: PaymentStore,
    placement: PlacementService,
}

fn harness_with(coordinator: Arc<dyn PaymentCoordinator>) -> Harness {
    let storage = OrderStorage::open_in_memory().unwrap();
    let payments = PaymentStore::new(storage.database()).unwrap();
    let ledger = Arc::new(IdempotencyLedger::new(
        storage.clone(),
        Duration::from_secs(5),
        Duration::from_secs(30),
    ));
    let placement = PlacementService::new(
        storage.clone(),
        ledger,
        seeded_menu() as Arc<dyn MenuProvider>,
        coordinator,
        test_config(),
    );
    Harness {
        storage,
        payments,
        placement,
    }
}

fn harness() -> Harness {
    let storage = OrderStorage::open_in_memory().unwrap();
    let payments = PaymentStore::new(storage.database()).unwrap();
    let coordinator = Arc::new(DirectPaymentCoordinator::new(payments.clone()));
    let ledger = Arc::new(IdempotencyLedger::new(
        storage.clone(),
        Duration::from_secs(5),
        Duration::from_secs(30),
    ));
    let placement = PlacementService::new(
        storage.clone(),
        ledger,
        seeded_menu() as Arc<dyn MenuProvider>,
        coordinator,
        test_config(),
    );
    Harness {
        storage,
        payments,
        placement,
    }
}

fn sample_draft() -> OrderDraft {
    OrderDraft {
        restaurant_id: "r-1".into(),
        items: vec![
            DraftItem {
                menu_item_id: "item-a".into(),
                quantity: 2,
            },
            DraftItem {
                menu_item_id: "item-b".into(),
                quantity: 1,
            },
        ],
        delivery_address: "12 Harbour Street".into(),
        payment_method: PaymentMethod::CashOnDelivery,
        client_total: None,
    }
}

// ========================================================================
// Scripted coordinators
// ========================================================================

/// Always refuses the payment
struct DecliningCoordinator;

#[async_trait]
impl PaymentCoordinator for DecliningCoordinator {
    async fn initiate(
        &self,
        _order_id: &str,
        _amount: f64,
        _method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        Err(PaymentError::Declined("insufficient funds".into()))
    }
}

/// Unreachable for the first `failures` calls, then settles
struct FlakyCoordinator {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyCoordinator {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PaymentCoordinator for FlakyCoordinator {
    async fn initiate(
        &self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(PaymentError::Unreachable("connection refused".into()));
        }
        let mut payment = Payment::new(order_id, amount, method);
        payment.status = PaymentStatus::Success;
        Ok(payment)
    }
}

/// Never answers within any reasonable time
struct HangingCoordinator;

#[async_trait]
impl PaymentCoordinator for HangingCoordinator {
    async fn initiate(
        &self,
        _order_id: &str,
        _amount: f64,
        _method: PaymentMethod,
    ) -> Result<Payment, PaymentError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the orchestrator must time out first")
    }
}

// ========================================================================
// Pricing and acceptance
// ========================================================================

#[tokio::test]
async fn successful_placement_prices_server_side_and_accepts() {
    let h = harness();

    let order = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();

    // 2 × $5.00 + 1 × $3.50
    assert_eq!(order.total, 13.5);
    assert_eq!(order.status, OrderStatus::Accepted);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].name, "Item A");
    assert_eq!(order.items[0].line_total, 10.0);
    assert!(order.payment_id.is_some());

    // The payment the coordinator recorded matches the server-side total.
    let payments = h.payments.list_by_order(&order.order_id).unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 13.5);
    assert_eq!(payments[0].status, PaymentStatus::Success);

    // Stored state agrees with the returned receipt.
    let stored = h.storage.get(&order.order_id).unwrap().unwrap();
    assert_eq!(stored, order);
}

#[tokio::test]
async fn client_supplied_total_is_ignored() {
    let h = harness();

    let mut draft = sample_draft();
    draft.client_total = Some(0.01);

    let order = h.placement.place_order("c-1", "k1", draft).await.unwrap();
    assert_eq!(order.total, 13.5);
}

// ========================================================================
// Idempotent replay
// ========================================================================

#[tokio::test]
async fn replay_returns_identical_outcome_and_no_new_side_effects() {
    let h = harness();

    let first = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();

    // Resubmit the same key with tampered content: one item, absurd total.
    let mut tampered = sample_draft();
    tampered.items.truncate(1);
    tampered.client_total = Some(0.01);

    let second = h
        .placement
        .place_order("c-1", "k1", tampered)
        .await
        .unwrap();

    assert_eq!(second, first);
    assert_eq!(second.total, 13.5);

    // Exactly one order row and one payment exist for the key.
    assert_eq!(h.storage.find_by_customer("c-1").unwrap().len(), 1);
    assert_eq!(h.payments.list_by_order(&first.order_id).unwrap().len(), 1);
}

#[tokio::test]
async fn same_key_from_another_caller_is_a_separate_placement() {
    let h = harness();

    let first = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    let second = h
        .placement
        .place_order("c-2", "k1", sample_draft())
        .await
        .unwrap();

    assert_ne!(first.order_id, second.order_id);
    assert_eq!(second.customer_id, "c-2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_placements_with_one_key_create_one_order() {
    let h = Arc::new(harness());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.placement.place_order("c-1", "k1", sample_draft()).await
        }));
    }

    let mut order_ids = Vec::new();
    for handle in handles {
        let order = handle.await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        order_ids.push(order.order_id);
    }
    order_ids.sort();
    order_ids.dedup();
    assert_eq!(order_ids.len(), 1, "all callers must see the same order");

    assert_eq!(h.storage.find_by_customer("c-1").unwrap().len(), 1);
    assert_eq!(h.payments.list_by_order(&order_ids[0]).unwrap().len(), 1);
}

#[tokio::test]
async fn captured_outcomes_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("orders.redb");

    let first = {
        let storage = OrderStorage::open(&db_path).unwrap();
        let payments = PaymentStore::new(storage.database()).unwrap();
        let coordinator = Arc::new(DirectPaymentCoordinator::new(payments));
        let ledger = Arc::new(IdempotencyLedger::new(
            storage.clone(),
            Duration::from_secs(5),
            Duration::from_secs(30),
        ));
        let placement = PlacementService::new(
            storage,
            ledger,
            seeded_menu() as Arc<dyn MenuProvider>,
            coordinator,
            test_config(),
        );
        placement
            .place_order("c-1", "k1", sample_draft())
            .await
            .unwrap()
    };

    // Fresh process: new storage handle, new ledger, same file.
    let storage = OrderStorage::open(&db_path).unwrap();
    let payments = PaymentStore::new(storage.database()).unwrap();
    let coordinator = Arc::new(DirectPaymentCoordinator::new(payments.clone()));
    let ledger = Arc::new(IdempotencyLedger::new(
        storage.clone(),
        Duration::from_secs(5),
        Duration::from_secs(30),
    ));
    let placement = PlacementService::new(
        storage,
        ledger,
        seeded_menu() as Arc<dyn MenuProvider>,
        coordinator,
        test_config(),
    );

    let replay = placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    assert_eq!(replay, first);
    assert_eq!(payments.list_by_order(&first.order_id).unwrap().len(), 1);
}

// ========================================================================
// Payment failure handling
// ========================================================================

#[tokio::test]
async fn declined_payment_leaves_a_declined_order_without_payment_ref() {
    let h = harness_with(Arc::new(DecliningCoordinator));

    let order = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Declined);
    assert!(order.payment_id.is_none());
    assert!(h.payments.list_by_order(&order.order_id).unwrap().is_empty());

    // The decline is the captured outcome: replaying does not retry payment.
    let replay = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    assert_eq!(replay, order);
}

#[tokio::test]
async fn transient_payment_failure_is_retried_to_success() {
    let h = harness_with(Arc::new(FlakyCoordinator::new(2)));

    let order = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);
}

#[tokio::test]
async fn exhausted_payment_retries_decline_the_order() {
    // More failures than the configured attempts.
    let h = harness_with(Arc::new(FlakyCoordinator::new(10)));

    let order = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Declined);
    assert!(order.payment_id.is_none());
}

#[tokio::test]
async fn hanging_payment_times_out_and_declines() {
    let h = harness_with(Arc::new(HangingCoordinator));

    let order = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    // Bounded wait: the order must not sit PENDING forever.
    assert_eq!(order.status, OrderStatus::Declined);
}

// ========================================================================
// Validation
// ========================================================================

#[tokio::test]
async fn invalid_drafts_are_rejected_before_persistence_and_key_stays_usable() {
    let h = harness();

    let mut unknown_item = sample_draft();
    unknown_item.items[0].menu_item_id = "item-404".into();
    assert!(
        h.placement
            .place_order("c-1", "k1", unknown_item)
            .await
            .is_err()
    );

    let mut zero_quantity = sample_draft();
    zero_quantity.items[0].quantity = 0;
    assert!(
        h.placement
            .place_order("c-1", "k1", zero_quantity)
            .await
            .is_err()
    );

    let mut unavailable = sample_draft();
    unavailable.items[0].menu_item_id = "item-off".into();
    assert!(
        h.placement
            .place_order("c-1", "k1", unavailable)
            .await
            .is_err()
    );

    let mut empty = sample_draft();
    empty.items.clear();
    assert!(h.placement.place_order("c-1", "k1", empty).await.is_err());

    // Nothing was persisted by the failed attempts.
    assert!(h.storage.find_by_customer("c-1").unwrap().is_empty());

    // The key is retryable once the draft is corrected.
    let order = h
        .placement
        .place_order("c-1", "k1", sample_draft())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);
}
