//! # Checkout Coordinator
//!
//! Turns a cart into exactly one committed transaction, or into nothing.
//!
//! ## Checkout Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    checkout(lines, key)                                 │
//! │                                                                         │
//! │  validate_cart ──✗──► EmptyCart / Validation                           │
//! │       │                                                                 │
//! │       ▼  (everything up to COMMIT bounded by checkout_timeout)          │
//! │  lock products in ascending id order ──✗──► Timeout("product locks")   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌── BEGIN ──────────────────────────────────────────────────────┐     │
//! │  │ key already in ledger?  ──► return that transaction (replay)  │     │
//! │  │ read every product      ──✗──► ProductNotFound                 │     │
//! │  │ plan lines (snapshots)  ──✗──► InsufficientStock               │     │
//! │  │ UPDATE stock WHERE stock >= qty   (ascending id)              │     │
//! │  │ INSERT transaction + items                                    │     │
//! │  │ deadline passed?        ──► ROLLBACK, Timeout("checkout")     │     │
//! │  └── COMMIT (awaited to completion, never cut short) ────────────┘     │
//! │       │                                                                 │
//! │       ├─ busy ──────► ROLLBACK, backoff, retry (max_conflict_retries)  │
//! │       │               then StoreUnavailable                            │
//! │       └─ lost race ─► ROLLBACK, backoff, retry on fresh stock          │
//! │                       then re-read: InsufficientStock if it is gone    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing is visible to other readers until COMMIT, so a failed checkout
//! leaves stock and the ledger exactly as they were.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kasir_core::validation::validate_cart;
use kasir_core::{CartLimits, CheckoutLine, CheckoutPlan, Transaction};
use kasir_db::repository::{ledger, product};
use kasir_db::{Database, DbError, DbTransaction, StockDecrement};

use crate::config::CheckoutSettings;
use crate::error::{CheckoutError, CheckoutResult, ConflictKind};
use crate::locks::StockLocks;

// =============================================================================
// Policy
// =============================================================================

/// Timeouts, retry budgets and cart limits applied to every checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutPolicy {
    pub lock_timeout: Duration,
    /// Budget for everything before COMMIT.
    pub checkout_timeout: Duration,
    pub max_conflict_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub limits: CartLimits,
}

impl From<&CheckoutSettings> for CheckoutPolicy {
    fn from(settings: &CheckoutSettings) -> Self {
        CheckoutPolicy {
            lock_timeout: settings.lock_timeout(),
            checkout_timeout: settings.checkout_timeout(),
            max_conflict_retries: settings.max_conflict_retries,
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
            limits: settings.cart_limits(),
        }
    }
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        CheckoutPolicy::from(&CheckoutSettings::default())
    }
}

/// Result of one transactional attempt.
#[derive(Debug)]
enum Attempt {
    Committed(Transaction),
    /// The idempotency key was already in the ledger.
    Replayed(Transaction),
}

/// Work done inside an open transaction, before COMMIT.
enum Staged {
    /// Stock taken and the ledger row written.
    Ready(DbTransaction, Transaction),
    Replayed(Transaction),
}

/// Deadline for the part of a checkout that can still be abandoned.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    at: Instant,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Deadline {
            started,
            at: started + budget,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    fn timed_out(&self) -> CheckoutError {
        CheckoutError::Timeout {
            stage: "checkout",
            waited_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    async fn bound<T>(&self, work: impl Future<Output = CheckoutResult<T>>) -> CheckoutResult<T> {
        match tokio::time::timeout_at(self.at, work).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Runs checkouts against one database.
///
/// Cheap to share behind an `Arc`; all checkouts in the process must go
/// through the same coordinator so they share one lock table.
#[derive(Debug)]
pub struct CheckoutCoordinator {
    db: Database,
    locks: Arc<StockLocks>,
    policy: CheckoutPolicy,
}

impl CheckoutCoordinator {
    pub fn new(db: Database, policy: CheckoutPolicy) -> Self {
        CheckoutCoordinator {
            db,
            locks: Arc::new(StockLocks::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &CheckoutPolicy {
        &self.policy
    }

    /// Commits `lines` as one transaction.
    ///
    /// With `idempotency_key`, a key that is already in the ledger returns
    /// the transaction it produced instead of selling again.
    pub async fn checkout(
        &self,
        lines: &[CheckoutLine],
        idempotency_key: Option<Uuid>,
    ) -> CheckoutResult<Transaction> {
        validate_cart(lines, &self.policy.limits)?;

        let key = idempotency_key.map(|key| key.hyphenated().to_string());
        let deadline = Deadline::after(self.policy.checkout_timeout);

        let result = self.run(lines, key.as_deref(), deadline).await;
        if let Err(CheckoutError::Timeout { stage, waited_ms }) = &result {
            warn!(lines = lines.len(), stage, waited_ms, "Checkout timed out");
        }
        result
    }

    /// Holds the cart's product locks across every attempt.
    async fn run(
        &self,
        lines: &[CheckoutLine],
        key: Option<&str>,
        deadline: Deadline,
    ) -> CheckoutResult<Transaction> {
        let _locks = deadline
            .bound(self.locks.acquire(
                lines.iter().map(|line| line.product_id),
                self.policy.lock_timeout,
            ))
            .await?;

        let mut backoff = self.create_backoff();
        let mut conflicts = 0u32;

        loop {
            let (kind, reason) = match self.attempt(lines, key, deadline).await {
                Ok(Attempt::Committed(transaction)) => return Ok(transaction),
                Ok(Attempt::Replayed(transaction)) => {
                    if !same_cart(lines, &transaction) {
                        warn!(
                            transaction_id = transaction.id,
                            idempotency_key = key.unwrap_or_default(),
                            "Idempotency key reused with a different cart, returning the original sale"
                        );
                    }
                    info!(
                        transaction_id = transaction.id,
                        idempotency_key = key.unwrap_or_default(),
                        "Checkout replayed"
                    );
                    return Ok(transaction);
                }
                Err(CheckoutError::ConcurrencyConflict { kind, reason }) => (kind, reason),
                Err(err) => return Err(err),
            };

            conflicts += 1;
            if conflicts > self.policy.max_conflict_retries {
                return Err(self.give_up(lines, kind, &reason, deadline).await);
            }

            let delay = backoff.next_backoff().unwrap_or(self.policy.max_backoff);
            debug!(attempt = conflicts, %kind, ?delay, reason = %reason, "Storage conflict, retrying");
            deadline
                .bound(async {
                    tokio::time::sleep(delay).await;
                    Ok::<_, CheckoutError>(())
                })
                .await?;
        }
    }

    /// Error for a checkout whose conflict retries are spent.
    async fn give_up(
        &self,
        lines: &[CheckoutLine],
        kind: ConflictKind,
        reason: &str,
        deadline: Deadline,
    ) -> CheckoutError {
        let retries = self.policy.max_conflict_retries;

        if kind == ConflictKind::LostRace {
            if let Err(err) = deadline.bound(self.recheck_stock(lines)).await {
                debug!(error = %err, "Stock re-read after lost races");
                return err;
            }
        }

        error!(
            retries,
            %kind,
            reason = %reason,
            "Giving up on checkout after repeated storage conflicts"
        );
        CheckoutError::StoreUnavailable(format!(
            "storage conflict ({kind}) persisted after {retries} retries: {reason}"
        ))
    }

    /// Plans `lines` against freshly read stock without writing anything.
    async fn recheck_stock(&self, lines: &[CheckoutLine]) -> CheckoutResult<()> {
        let mut tx = self.db.begin().await?;
        load_plan(&mut tx, lines).await?;
        Ok(())
    }

    /// One database transaction. Only COMMIT runs past the deadline.
    async fn attempt(
        &self,
        lines: &[CheckoutLine],
        key: Option<&str>,
        deadline: Deadline,
    ) -> CheckoutResult<Attempt> {
        let (tx, transaction) = match deadline.bound(self.stage(lines, key)).await? {
            Staged::Replayed(existing) => return Ok(Attempt::Replayed(existing)),
            Staged::Ready(tx, transaction) => (tx, transaction),
        };

        if deadline.expired() {
            // Dropped uncommitted, the transaction rolls back.
            drop(tx);
            return Err(deadline.timed_out());
        }

        // A COMMIT that has been sent may land even if nobody waits for it.
        tx.commit().await.map_err(DbError::from)?;

        info!(
            transaction_id = transaction.id,
            total = %transaction.total_amount,
            item_count = transaction.item_count,
            lines = transaction.items.len(),
            "Checkout committed"
        );

        Ok(Attempt::Committed(transaction))
    }

    /// Replay check, plan, conditional decrements and ledger append.
    async fn stage(&self, lines: &[CheckoutLine], key: Option<&str>) -> CheckoutResult<Staged> {
        let mut tx = self.db.begin().await?;

        if let Some(key) = key {
            if let Some(existing) = ledger::find_by_idempotency_key(&mut tx, key).await? {
                return Ok(Staged::Replayed(existing));
            }
        }

        let plan = load_plan(&mut tx, lines).await?;

        let now = Utc::now();
        for (product_id, quantity) in plan.decrements() {
            match product::decrement_stock_if_available(&mut tx, product_id, quantity, now).await {
                Ok(StockDecrement::Applied(updated)) => {
                    debug!(product_id, quantity, remaining = updated.stock, "Stock taken");
                }
                Ok(StockDecrement::Insufficient { available }) => {
                    return Err(CheckoutError::conflict(
                        ConflictKind::LostRace,
                        format!("product {product_id} has {available} left, {quantity} planned"),
                    ));
                }
                Err(DbError::NotFound { .. }) => {
                    return Err(CheckoutError::ProductNotFound { product_id });
                }
                Err(err) => return Err(err.into()),
            }
        }

        match ledger::append(&mut tx, &plan, Utc::now(), key).await {
            Ok(transaction) => Ok(Staged::Ready(tx, transaction)),
            Err(err) if err.is_unique_violation_on("idempotency_key") => {
                // Another process committed this key first.
                drop(tx);
                self.replay_after_duplicate(key, err).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn replay_after_duplicate(
        &self,
        key: Option<&str>,
        err: DbError,
    ) -> CheckoutResult<Staged> {
        let Some(key) = key else {
            return Err(err.into());
        };

        match self.db.ledger().get_by_idempotency_key(key).await? {
            Some(existing) => Ok(Staged::Replayed(existing)),
            None => Err(CheckoutError::conflict(
                ConflictKind::Busy,
                format!("idempotency key {key} reported taken but not yet visible"),
            )),
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.policy.initial_backoff,
            max_interval: self.policy.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Reads every product in `lines` and plans the sale against its stock.
async fn load_plan(tx: &mut DbTransaction, lines: &[CheckoutLine]) -> CheckoutResult<CheckoutPlan> {
    let mut plan = CheckoutPlan::with_capacity(lines.len());
    for line in lines {
        let product = product::fetch_by_id(&mut **tx, line.product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound {
                product_id: line.product_id,
            })?;
        plan.add_line(&product, line.quantity)?;
    }
    Ok(plan)
}

/// Whether `transaction` sold the same quantity of each product as `lines`.
fn same_cart(lines: &[CheckoutLine], transaction: &Transaction) -> bool {
    fn per_product(pairs: impl Iterator<Item = (i64, i64)>) -> BTreeMap<i64, i64> {
        let mut totals = BTreeMap::new();
        for (product_id, quantity) in pairs {
            *totals.entry(product_id).or_insert(0) += quantity;
        }
        totals
    }

    per_product(lines.iter().map(|line| (line.product_id, line.quantity)))
        == per_product(
            transaction
                .items
                .iter()
                .map(|item| (item.product_id, item.quantity)),
        )
}

// =============================================================================
// Unit Tests
// =============================================================================
