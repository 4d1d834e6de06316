//! # kasir-engine: Checkout Coordinator & Reports for Kasir POS
//!
//! The concurrency-aware layer between callers (CLI, cashier UI) and the
//! store. Every sale goes through [`PosEngine::checkout`].
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PosEngine                                        │
//! │                                                                         │
//! │   checkout / checkout_idempotent                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌──────────────────────┐    ┌──────────────────────┐                 │
//! │   │ CheckoutCoordinator  │───►│ StockLocks           │                 │
//! │   │ validate, plan,      │    │ ordered per-product  │                 │
//! │   │ commit, retry        │    │ async mutexes        │                 │
//! │   └──────────┬───────────┘    └──────────────────────┘                 │
//! │              │ one sqlx transaction per attempt                        │
//! │              ▼                                                          │
//! │   ┌─────────────────────────────────────────────────────────────┐      │
//! │   │ kasir-db: products (stock)  •  transactions + items (ledger)│      │
//! │   └─────────────────────────────────────────────────────────────┘      │
//! │              ▲                                                          │
//! │              │ read only                                                │
//! │   ┌──────────┴───────────┐                                             │
//! │   │ ReportAggregator     │◄── daily_report / range_report              │
//! │   └──────────────────────┘                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use kasir_engine::{EngineConfig, PosEngine};
//!
//! let engine = PosEngine::open(EngineConfig::load(None)?).await?;
//! let txn = engine.checkout(&[(1, 2).into(), (2, 1).into()]).await?;
//! let today = engine.daily_report(chrono::Local::now().date_naive()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod locks;
pub mod reports;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use coordinator::{CheckoutCoordinator, CheckoutPolicy};
pub use error::{
    CheckoutError, CheckoutResult, ConfigError, ConfigResult, ConflictKind, QueryError,
    QueryResult, ReportError, ReportResult,
};
pub use kasir_db::seed::SeedOutcome;
pub use reports::ReportAggregator;

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use tracing::info;
use uuid::Uuid;

use kasir_core::validation::validate_page_size;
use kasir_core::{
    CheckoutLine, DailyReport, Product, RangeReport, SortOrder, Transaction, DEFAULT_PAGE_SIZE,
};
use kasir_db::seed::seed_catalog;
use kasir_db::{Database, DbResult};

// =============================================================================
// Engine
// =============================================================================

/// Entry point for checkouts, transaction lookups and reports.
///
/// Clones share the same database pool and lock table, so a clone can be
/// handed to each task that takes sales.
#[derive(Debug, Clone)]
pub struct PosEngine {
    db: Database,
    coordinator: Arc<CheckoutCoordinator>,
    reports: ReportAggregator,
}

impl PosEngine {
    /// Opens the configured database (running migrations) and builds the engine.
    pub async fn open(config: EngineConfig) -> DbResult<Self> {
        if let Some(parent) = config.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    kasir_db::DbError::ConnectionFailed(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Database::new(config.db_config()).await?;
        info!(path = %config.database.path.display(), "Engine opened");
        Ok(Self::with_database(db, &config))
    }

    /// Builds the engine over an already opened database.
    pub fn with_database(db: Database, config: &EngineConfig) -> Self {
        let policy = CheckoutPolicy::from(&config.checkout);
        PosEngine {
            coordinator: Arc::new(CheckoutCoordinator::new(db.clone(), policy)),
            reports: ReportAggregator::new(db.clone(), config.report.top_products_limit),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Sells `items` as one transaction, or nothing at all.
    pub async fn checkout(&self, items: &[CheckoutLine]) -> CheckoutResult<Transaction> {
        self.coordinator.checkout(items, None).await
    }

    /// Like [`checkout`](Self::checkout), but at most once per `key`.
    ///
    /// Resubmitting a key that already committed returns that transaction
    /// unchanged and moves no stock.
    pub async fn checkout_idempotent(
        &self,
        key: Uuid,
        items: &[CheckoutLine],
    ) -> CheckoutResult<Transaction> {
        self.coordinator.checkout(items, Some(key)).await
    }

    // =========================================================================
    // Ledger Queries
    // =========================================================================

    /// A committed transaction with its items, if `id` exists.
    pub async fn get_transaction(&self, id: i64) -> QueryResult<Option<Transaction>> {
        Ok(self.db.ledger().get(id).await?)
    }

    /// Transactions newest first. `limit` defaults to 50.
    pub async fn list_transactions(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> QueryResult<Vec<Transaction>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        validate_page_size(limit)?;

        Ok(self.db.ledger().list(limit, offset).await?)
    }

    /// Transactions committed in `[start, end)`.
    pub async fn transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SortOrder,
        limit: u32,
        offset: u32,
    ) -> QueryResult<Vec<Transaction>> {
        validate_page_size(limit)?;

        Ok(self
            .db
            .ledger()
            .list_by_time_range(start, end, order, limit, offset)
            .await?)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Sales for local calendar day `date`.
    pub async fn daily_report(&self, date: NaiveDate) -> ReportResult<DailyReport> {
        self.reports.daily_report_in(date, &Local).await
    }

    pub async fn daily_report_in<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> ReportResult<DailyReport> {
        self.reports.daily_report_in(date, tz).await
    }

    /// Sales across local days `start` through `end`, inclusive.
    pub async fn range_report(&self, start: NaiveDate, end: NaiveDate) -> ReportResult<RangeReport> {
        self.reports.range_report_in(start, end, &Local).await
    }

    pub async fn range_report_in<Tz: TimeZone>(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        tz: &Tz,
    ) -> ReportResult<RangeReport> {
        self.reports.range_report_in(start, end, tz).await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Finds a product by its code (barcode or SKU).
    pub async fn lookup_product(&self, code: &str) -> QueryResult<Option<Product>> {
        Ok(self.db.products().get_by_code(code).await?)
    }

    /// Products ordered by name.
    pub async fn list_products(&self, limit: Option<u32>) -> QueryResult<Vec<Product>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        validate_page_size(limit)?;

        Ok(self.db.products().list(limit).await?)
    }

    /// Loads the demo catalog into an empty database.
    pub async fn seed(&self) -> QueryResult<SeedOutcome> {
        Ok(seed_catalog(&self.db).await?)
    }
}
