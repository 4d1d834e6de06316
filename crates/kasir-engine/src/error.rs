//! # Engine Error Types
//!
//! What callers of [`PosEngine`](crate::PosEngine) see.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Checkout Error Categories                            │
//! │                                                                         │
//! │  BUSINESS (not retryable, caller must change the cart)                 │
//! │  ├── EmptyCart                                                         │
//! │  ├── Validation            quantity ≤ 0, too many lines                │
//! │  ├── ProductNotFound       unknown product id                          │
//! │  └── InsufficientStock     available < requested                       │
//! │                                                                         │
//! │  TRANSIENT (retryable, same cart may succeed later)                    │
//! │  ├── ConcurrencyConflict   busy or lost race; retried internally       │
//! │  ├── Timeout               lock wait or work before COMMIT too slow    │
//! │  └── StoreUnavailable      I/O failure or busy retries exhausted       │
//! │                                                                         │
//! │  Lost races that exhaust their retries re-read stock and surface as    │
//! │  InsufficientStock when the stock really is gone.                      │
//! │                                                                         │
//! │  Either way: nothing was persisted and no transaction id exists.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use thiserror::Error;

use kasir_core::{CoreError, ValidationError};
use kasir_db::DbError;

// =============================================================================
// Checkout Errors
// =============================================================================

/// Why a checkout did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid cart: {0}")]
    Validation(ValidationError),

    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: i64 },

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// The store reported a lock or snapshot conflict.
    #[error("Storage conflict ({kind}): {reason}")]
    ConcurrencyConflict { kind: ConflictKind, reason: String },

    #[error("Checkout timed out waiting for {stage} after {waited_ms} ms")]
    Timeout { stage: &'static str, waited_ms: u64 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CheckoutError {
    /// Whether resubmitting the same cart might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::ConcurrencyConflict { .. }
                | CheckoutError::Timeout { .. }
                | CheckoutError::StoreUnavailable(_)
        )
    }
}

/// Why an attempt did not get to COMMIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The write lock stayed taken past `busy_timeout`, or no pooled
    /// connection was free.
    Busy,
    /// Another writer committed over stock this attempt had read.
    LostRace,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Busy => write!(f, "busy"),
            ConflictKind::LostRace => write!(f, "lost race"),
        }
    }
}

impl CheckoutError {
    pub(crate) fn conflict(kind: ConflictKind, reason: impl Into<String>) -> Self {
        CheckoutError::ConcurrencyConflict {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<CoreError> for CheckoutError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EmptyCart => CheckoutError::EmptyCart,
            CoreError::ProductNotFound(product_id) => CheckoutError::ProductNotFound { product_id },
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => CheckoutError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::Validation(validation) => CheckoutError::Validation(validation),
            CoreError::AmountOverflow { context } => {
                CheckoutError::Validation(ValidationError::OutOfRange {
                    field: context.to_string(),
                    min: 0,
                    max: i64::MAX,
                })
            }
            other => CheckoutError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        if err.is_stale_snapshot() {
            return CheckoutError::conflict(ConflictKind::LostRace, err.to_string());
        }
        if err.is_busy() {
            return CheckoutError::conflict(ConflictKind::Busy, err.to_string());
        }
        match err {
            DbError::Validation(validation) => CheckoutError::Validation(validation),
            other => CheckoutError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

// =============================================================================
// Report Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("No local start of day for {0}")]
    InvalidDate(NaiveDate),

    #[error("Report aggregation failed: {0}")]
    Aggregation(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<CoreError> for ReportError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidRange { start, end } => ReportError::InvalidRange { start, end },
            CoreError::UnresolvableDay { date } => ReportError::InvalidDate(date),
            other => ReportError::Aggregation(other.to_string()),
        }
    }
}

impl From<DbError> for ReportError {
    fn from(err: DbError) -> Self {
        ReportError::StoreUnavailable(err.to_string())
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

// =============================================================================
// Lookup Errors
// =============================================================================

/// Errors from read-only lookups (transactions, products).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<DbError> for QueryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(validation) => QueryError::Validation(validation),
            other => QueryError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;

// =============================================================================
// Configuration Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CheckoutError::conflict(ConflictKind::Busy, "locked").is_retryable());
        assert!(CheckoutError::Timeout {
            stage: "product locks",
            waited_ms: 10
        }
        .is_retryable());
        assert!(CheckoutError::StoreUnavailable("io".into()).is_retryable());

        assert!(!CheckoutError::EmptyCart.is_retryable());
        assert!(!CheckoutError::ProductNotFound { product_id: 1 }.is_retryable());
        assert!(!CheckoutError::InsufficientStock {
            product_id: 1,
            available: 0,
            requested: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_core_errors_map_to_checkout_errors() {
        let err: CheckoutError = CoreError::InsufficientStock {
            product_id: 2,
            available: 0,
            requested: 1,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 2: available 0, requested 1"
        );

        let err: CheckoutError = CoreError::AmountOverflow { context: "subtotal" }.into();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[test]
    fn test_busy_db_error_is_conflict() {
        let err: CheckoutError = DbError::Busy("database is locked".into()).into();
        assert!(matches!(
            err,
            CheckoutError::ConcurrencyConflict {
                kind: ConflictKind::Busy,
                ..
            }
        ));

        let err: CheckoutError = DbError::StaleSnapshot("database is locked".into()).into();
        assert!(matches!(
            err,
            CheckoutError::ConcurrencyConflict {
                kind: ConflictKind::LostRace,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Storage conflict (lost race): Stale snapshot: database is locked"
        );

        let err: CheckoutError = DbError::QueryFailed("disk I/O error".into()).into();
        assert!(matches!(err, CheckoutError::StoreUnavailable(_)));
    }
}
