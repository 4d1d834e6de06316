//! # Schema Migrations
//!
//! The schema lives in `migrations/sqlite/` at the workspace root and is
//! compiled into the crate, so a binary never needs the SQL files at runtime.
//!
//! ```text
//! 001_initial_schema.sql
//!   products           code UNIQUE, stock CHECK (stock >= 0)
//!   transactions       idempotency_key UNIQUE, index on (created_at, id)
//!   transaction_items  FK → transactions ON DELETE RESTRICT
//! ```
//!
//! Applied files are recorded in `_sqlx_migrations`. Change the schema by
//! adding `NNN_description.sql`; an applied file must never be edited.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(known = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// `(known, applied)` migration counts.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await?;

    Ok((total, applied as usize))
}
