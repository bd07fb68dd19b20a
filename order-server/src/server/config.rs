/// Server configuration, loaded from environment variables with defaults
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub data_dir: String,
    pub environment: String,

    /// Optional JSON file the menu catalog is seeded from at startup
    pub menu_path: Option<String>,

    /// Shared token for trusted internal callers (kitchen, delivery)
    pub internal_token: String,

    pub request_timeout_ms: u64,

    // Placement orchestration knobs
    pub dependency_attempts: u32,
    pub dependency_backoff_ms: u64,
    pub payment_timeout_ms: u64,

    // Idempotency ledger knobs
    pub ledger_wait_ms: u64,
    pub ledger_stale_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "/var/lib/order-server".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            menu_path: std::env::var("MENU_PATH").ok().filter(|p| !p.is_empty()),
            internal_token: std::env::var("INTERNAL_TOKEN")
                .unwrap_or_else(|_| "dev-internal-token".into()),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(30000),
            dependency_attempts: std::env::var("DEPENDENCY_ATTEMPTS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3),
            dependency_backoff_ms: std::env::var("DEPENDENCY_BACKOFF_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(200),
            payment_timeout_ms: std::env::var("PAYMENT_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            ledger_wait_ms: std::env::var("LEDGER_WAIT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(10000),
            ledger_stale_ms: std::env::var("LEDGER_STALE_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60000),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
