//! # Ledger Repository
//!
//! Append-only store of committed transactions and their line items.
//!
//! ## Ledger Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ledger Lifecycle                                  │
//! │                                                                         │
//! │  1. APPEND (inside the checkout's database transaction)                │
//! │     └── append(&mut tx, plan, created_at, key)                         │
//! │         ├── INSERT transactions        → id (AUTOINCREMENT)            │
//! │         └── INSERT transaction_items   → one row per plan line         │
//! │                                                                         │
//! │  2. COMMIT (by the caller)                                             │
//! │     └── header and items become visible together, or not at all        │
//! │                                                                         │
//! │  3. READ                                                               │
//! │     ├── get(id)                                                        │
//! │     ├── list(limit, offset)                  newest first              │
//! │     ├── list_by_time_range(start, end, ...)  [start, end)              │
//! │     └── list_in_window(window)               reports, oldest first     │
//! │                                                                         │
//! │  There is no UPDATE and no DELETE.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::{CheckoutPlan, ReportWindow, SortOrder, Transaction, TransactionItem};

const TRANSACTION_COLUMNS: &str =
    "id, created_at, total_amount_cents, item_count, idempotency_key";

const ITEM_COLUMNS: &str = "transaction_id, line_no, product_id, product_name, quantity, \
                            price_per_unit_cents, subtotal_cents";

// =============================================================================
// Connection-level Operations
// =============================================================================

/// Writes a transaction and its items on the given connection.
///
/// Must run inside a database transaction together with the stock
/// decrements it accounts for; nothing here commits.
pub async fn append(
    conn: &mut SqliteConnection,
    plan: &CheckoutPlan,
    created_at: DateTime<Utc>,
    idempotency_key: Option<&str>,
) -> DbResult<Transaction> {
    if plan.is_empty() {
        return Err(DbError::Internal(
            "refusing to append a transaction without lines".to_string(),
        ));
    }

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO transactions (created_at, total_amount_cents, item_count, idempotency_key) \
         VALUES (?1, ?2, ?3, ?4) \
         RETURNING id",
    )
    .bind(created_at)
    .bind(plan.total_amount())
    .bind(plan.item_count())
    .bind(idempotency_key)
    .fetch_one(&mut *conn)
    .await?;

    let items: Vec<TransactionItem> = plan.lines().iter().map(|line| line.to_item(id)).collect();

    let mut insert: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "INSERT INTO transaction_items ({ITEM_COLUMNS}) "
    ));
    insert.push_values(&items, |mut row, item| {
        row.push_bind(item.transaction_id)
            .push_bind(item.line_no)
            .push_bind(item.product_id)
            .push_bind(item.product_name.clone())
            .push_bind(item.quantity)
            .push_bind(item.price_per_unit)
            .push_bind(item.subtotal);
    });
    insert.build().execute(&mut *conn).await?;

    debug!(
        transaction_id = id,
        lines = items.len(),
        total = %plan.total_amount(),
        "Ledger append"
    );

    Ok(Transaction {
        id,
        created_at,
        total_amount: plan.total_amount(),
        item_count: plan.item_count(),
        idempotency_key: idempotency_key.map(str::to_string),
        items,
    })
}

/// Looks up a committed transaction by its idempotency key.
pub async fn find_by_idempotency_key(
    conn: &mut SqliteConnection,
    key: &str,
) -> DbResult<Option<Transaction>> {
    let header = sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE idempotency_key = ?1"
    ))
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    match header {
        Some(txn) => Ok(with_items(conn, vec![txn]).await?.pop()),
        None => Ok(None),
    }
}

/// Fills in `items` for every transaction, in line order.
async fn with_items(
    conn: &mut SqliteConnection,
    mut transactions: Vec<Transaction>,
) -> DbResult<Vec<Transaction>> {
    if transactions.is_empty() {
        return Ok(transactions);
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {ITEM_COLUMNS} FROM transaction_items WHERE transaction_id IN ("
    ));
    let mut ids = query.separated(", ");
    for txn in &transactions {
        ids.push_bind(txn.id);
    }
    query.push(") ORDER BY transaction_id, line_no");

    let rows: Vec<TransactionItem> = query.build_query_as().fetch_all(&mut *conn).await?;

    let mut grouped: HashMap<i64, Vec<TransactionItem>> = HashMap::new();
    for item in rows {
        grouped.entry(item.transaction_id).or_default().push(item);
    }
    for txn in &mut transactions {
        txn.items = grouped.remove(&txn.id).unwrap_or_default();
    }

    Ok(transactions)
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to the transaction ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Gets a transaction with its items.
    pub async fn get(&self, id: i64) -> DbResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;

        let header = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match header {
            Some(txn) => Ok(with_items(&mut conn, vec![txn]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Gets a transaction by the idempotency key it was committed with.
    pub async fn get_by_idempotency_key(&self, key: &str) -> DbResult<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        find_by_idempotency_key(&mut conn, key).await
    }

    /// Lists transactions newest first.
    pub async fn list(&self, limit: u32, offset: u32) -> DbResult<Vec<Transaction>> {
        self.fetch_page(None, SortOrder::Descending, Some(limit), offset, true)
            .await
    }

    /// Lists transactions committed in `[start, end)`, ordered by commit time
    /// (ties broken by id).
    pub async fn list_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SortOrder,
        limit: u32,
        offset: u32,
    ) -> DbResult<Vec<Transaction>> {
        self.fetch_page(Some((start, end)), order, Some(limit), offset, true)
            .await
    }

    /// Every transaction inside a report window, oldest first.
    pub async fn list_in_window(&self, window: &ReportWindow) -> DbResult<Vec<Transaction>> {
        self.fetch_page(
            Some((window.start, window.end)),
            SortOrder::Ascending,
            None,
            0,
            true,
        )
        .await
    }

    /// Like [`list_in_window`](Self::list_in_window) but with `items` left empty.
    pub async fn headers_in_window(&self, window: &ReportWindow) -> DbResult<Vec<Transaction>> {
        self.fetch_page(
            Some((window.start, window.end)),
            SortOrder::Ascending,
            None,
            0,
            false,
        )
        .await
    }

    /// Number of committed transactions.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn fetch_page(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        order: SortOrder,
        limit: Option<u32>,
        offset: u32,
        load_items: bool,
    ) -> DbResult<Vec<Transaction>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions"
        ));

        if let Some((start, end)) = range {
            query
                .push(" WHERE created_at >= ")
                .push_bind(start)
                .push(" AND created_at < ")
                .push_bind(end);
        }

        let direction = order.as_sql();
        query.push(format!(
            " ORDER BY created_at {direction}, id {direction} LIMIT "
        ));
        // SQLite: a negative LIMIT means no limit
        query.push_bind(limit.map(i64::from).unwrap_or(-1));
        query.push(" OFFSET ").push_bind(i64::from(offset));

        let mut conn = self.pool.acquire().await?;
        let headers: Vec<Transaction> = query.build_query_as().fetch_all(&mut *conn).await?;

        debug!(count = headers.len(), load_items, "Ledger page fetched");
        if load_items {
            with_items(&mut conn, headers).await
        } else {
            Ok(headers)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
