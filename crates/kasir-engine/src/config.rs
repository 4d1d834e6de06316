//! # Engine Configuration
//!
//! Configuration management for the checkout engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASIR_DB_PATH=/var/lib/kasir/kasir.db                              │
//! │     KASIR_LOCK_TIMEOUT_MS=2000                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kasir/kasir.toml (Linux)                                 │
//! │     ~/Library/Application Support/id.kasir.kasir/kasir.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/kasir/kasir.db"
//! max_connections = 8
//! busy_timeout_ms = 5000
//!
//! [checkout]
//! lock_timeout_ms = 2000
//! checkout_timeout_ms = 10000
//! max_conflict_retries = 10
//!
//! [report]
//! top_products_limit = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use kasir_core::{CartLimits, MAX_CART_LINES, MAX_LINE_QUANTITY, TOP_PRODUCTS_LIMIT};
use kasir_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `kasir.db` in the platform data directory.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite waits on another writer before reporting busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("id", "kasir", "kasir")
        .map(|dirs| dirs.data_dir().join("kasir.db"))
        .unwrap_or_else(|| PathBuf::from("kasir.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Checkout Settings
// =============================================================================

/// Checkout concurrency and cart-shape settings.
///
/// ## Retry Budget
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  checkout_timeout_ms ─────────────────────────────────────────────┐    │
/// │  │ lock wait ≤ lock_timeout_ms                                    │    │
/// │  │ attempt ─ conflict ─ backoff ─ attempt ─ ... (≤ max_conflict)  │    │
/// │  │ budget spent on lost races ─ re-read stock ─ InsufficientStock │    │
/// │  │ COMMIT is never cut short by the deadline                      │    │
/// │  └────────────────────────────────────────────────────────────────┘    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Maximum wait for the cart's product locks.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Budget for a checkout up to COMMIT, locks and retries included.
    #[serde(default = "default_checkout_timeout")]
    pub checkout_timeout_ms: u64,

    /// Retries after the store reports busy or another writer wins the race.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_max_cart_lines")]
    pub max_cart_lines: usize,

    #[serde(default = "default_max_line_quantity")]
    pub max_line_quantity: i64,
}

fn default_lock_timeout() -> u64 {
    2_000
}

fn default_checkout_timeout() -> u64 {
    10_000
}

fn default_max_conflict_retries() -> u32 {
    10
}

fn default_initial_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    200
}

fn default_max_cart_lines() -> usize {
    MAX_CART_LINES
}

fn default_max_line_quantity() -> i64 {
    MAX_LINE_QUANTITY
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        CheckoutSettings {
            lock_timeout_ms: default_lock_timeout(),
            checkout_timeout_ms: default_checkout_timeout(),
            max_conflict_retries: default_max_conflict_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_cart_lines: default_max_cart_lines(),
            max_line_quantity: default_max_line_quantity(),
        }
    }
}

impl CheckoutSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn cart_limits(&self) -> CartLimits {
        CartLimits {
            max_lines: self.max_cart_lines,
            max_line_quantity: self.max_line_quantity,
        }
    }
}

// =============================================================================
// Report Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSettings {
    #[serde(default = "default_top_products_limit")]
    pub top_products_limit: usize,
}

fn default_top_products_limit() -> usize {
    TOP_PRODUCTS_LIMIT
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings {
            top_products_limit: default_top_products_limit(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub checkout: CheckoutSettings,

    #[serde(default)]
    pub report: ReportSettings,
}

impl EngineConfig {
    /// Defaults with the database at `path`.
    pub fn with_database_path(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.database.path = path.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kasir.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        let checkout = &self.checkout;
        if checkout.lock_timeout_ms == 0 || checkout.checkout_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "checkout timeouts must be greater than 0".into(),
            ));
        }

        if checkout.lock_timeout_ms > checkout.checkout_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "checkout.lock_timeout_ms ({}) exceeds checkout.checkout_timeout_ms ({})",
                checkout.lock_timeout_ms, checkout.checkout_timeout_ms
            )));
        }

        if checkout.initial_backoff_ms > checkout.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "checkout.initial_backoff_ms must not exceed checkout.max_backoff_ms".into(),
            ));
        }

        if checkout.max_cart_lines == 0 || checkout.max_line_quantity <= 0 {
            return Err(ConfigError::Invalid(
                "cart limits must be greater than 0".into(),
            ));
        }

        if self.report.top_products_limit == 0 {
            return Err(ConfigError::Invalid(
                "report.top_products_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup (the process environment in
    /// production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("KASIR_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_number(&lookup, "KASIR_LOCK_TIMEOUT_MS", &mut self.checkout.lock_timeout_ms);
        override_number(
            &lookup,
            "KASIR_CHECKOUT_TIMEOUT_MS",
            &mut self.checkout.checkout_timeout_ms,
        );
        override_number(
            &lookup,
            "KASIR_MAX_CONFLICT_RETRIES",
            &mut self.checkout.max_conflict_retries,
        );
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("id", "kasir", "kasir")
            .map(|dirs| dirs.config_dir().join("kasir.toml"))
    }

    /// Pool settings for [`kasir_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => {
                debug!(key, value = %raw, "Overriding setting from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparsable setting in environment"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
