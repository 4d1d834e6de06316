//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── Busy          → engine retries with backoff                  │
//! │       ├── StaleSnapshot → another writer won; engine re-reads stock    │
//! │       ▼                                                                 │
//! │  CheckoutError (kasir-engine) ← What the caller sees                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kasir_core::ValidationError;
use thiserror::Error;

/// SQLite primary result codes that mean "try again later".
///
/// `SQLITE_BUSY` (5) and `SQLITE_LOCKED` (6), plus the extended codes
/// `BUSY_RECOVERY` (261) and `LOCKED_SHAREDCACHE` (262).
const RETRYABLE_CODES: &[&str] = &["5", "6", "261", "262"];

/// `SQLITE_BUSY_SNAPSHOT`: a WAL read snapshot went stale before its write.
const BUSY_SNAPSHOT: &str = "517";

/// Failures of the inventory store and the ledger.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate product code
    /// - Two checkouts racing with the same idempotency key
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// CHECK constraint violation (negative stock, non-positive quantity).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    /// Record rejected before reaching SQL.
    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Another connection held the write lock past `busy_timeout`.
    #[error("Database busy: {0}")]
    Busy(String),

    /// A deferred transaction tried to write after another connection
    /// committed over the rows it had read (WAL `BUSY_SNAPSHOT`).
    #[error("Stale snapshot: {0}")]
    StaleSnapshot(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Any other statement failure (I/O, disk full, corrupt file).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// No pooled connection freed up within `connect_timeout`.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether the operation may succeed if simply retried.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_) | DbError::StaleSnapshot(_) | DbError::PoolExhausted
        )
    }

    /// Whether another writer committed over what this transaction read.
    pub fn is_stale_snapshot(&self) -> bool {
        matches!(self, DbError::StaleSnapshot(_))
    }

    /// Whether this is a unique violation on the given column (`table.column`).
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

/// ## Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → StaleSnapshot / Busy by result code,
///                               else constraint by message
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();

                if code.as_deref() == Some(BUSY_SNAPSHOT) {
                    return DbError::StaleSnapshot(msg.to_string());
                }

                if code
                    .as_deref()
                    .is_some_and(|code| RETRYABLE_CODES.contains(&code))
                    || msg.contains("database is locked")
                {
                    return DbError::Busy(msg.to_string());
                }

                // SQLite constraint messages:
                // "UNIQUE constraint failed: <table>.<column>"
                // "CHECK constraint failed: <expr>"
                // "FOREIGN KEY constraint failed"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_classification() {
        assert!(DbError::Busy("database is locked".into()).is_busy());
        assert!(DbError::PoolExhausted.is_busy());
        assert!(DbError::StaleSnapshot("database is locked".into()).is_busy());
        assert!(DbError::StaleSnapshot("database is locked".into()).is_stale_snapshot());
        assert!(!DbError::Busy("database is locked".into()).is_stale_snapshot());
        assert!(!DbError::not_found("Product", 7).is_busy());
    }

    #[test]
    fn test_unique_violation_column_match() {
        let err = DbError::duplicate("transactions.idempotency_key", "abc");
        assert!(err.is_unique_violation_on("idempotency_key"));
        assert!(!err.is_unique_violation_on("code"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
