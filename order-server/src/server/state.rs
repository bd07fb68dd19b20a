use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::menu::{MenuCatalog, MenuProvider};
use crate::orders::{
    IdempotencyLedger, OrderStorage, PlacementConfig, PlacementService, StatusService,
};
use crate::payment::{DirectPaymentCoordinator, PaymentCoordinator, PaymentStore};
use crate::server::Config;

/// Shared application state: the wired-up order core
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    storage: OrderStorage,
    menu: Arc<MenuCatalog>,
    payments: PaymentStore,
    placement: Arc<PlacementService>,
    status: Arc<StatusService>,
}

impl ServerState {
    /// Open the database under the configured data dir and wire everything up
    pub fn initialize(config: &Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = PathBuf::from(&config.data_dir).join("orders.redb");
        let storage = OrderStorage::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "order storage opened");
        Self::with_storage(config.clone(), storage)
    }

    /// Wire services onto existing storage (tests, embedding)
    pub fn with_storage(config: Config, storage: OrderStorage) -> anyhow::Result<Self> {
        let payments = PaymentStore::new(storage.database())?;

        let menu = match &config.menu_path {
            Some(path) => Arc::new(MenuCatalog::load_from_file(path)?),
            None => {
                tracing::warn!("no MENU_PATH configured, starting with an empty menu catalog");
                Arc::new(MenuCatalog::new())
            }
        };

        let ledger = Arc::new(IdempotencyLedger::new(
            storage.clone(),
            Duration::from_millis(config.ledger_wait_ms),
            Duration::from_millis(config.ledger_stale_ms),
        ));

        let coordinator: Arc<dyn PaymentCoordinator> =
            Arc::new(DirectPaymentCoordinator::new(payments.clone()));

        let placement = Arc::new(PlacementService::new(
            storage.clone(),
            ledger,
            menu.clone() as Arc<dyn MenuProvider>,
            coordinator,
            PlacementConfig {
                dependency_attempts: config.dependency_attempts,
                dependency_backoff: Duration::from_millis(config.dependency_backoff_ms),
                payment_timeout: Duration::from_millis(config.payment_timeout_ms),
            },
        ));

        let status = Arc::new(StatusService::new(storage.clone()));

        Ok(Self {
            config,
            storage,
            menu,
            payments,
            placement,
            status,
        })
    }

    pub fn placement(&self) -> &PlacementService {
        &self.placement
    }

    pub fn status(&self) -> &StatusService {
        &self.status
    }

    pub fn menu(&self) -> &MenuCatalog {
        &self.menu
    }

    pub fn payments(&self) -> &PaymentStore {
        &self.payments
    }

    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }
}
