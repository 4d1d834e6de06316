//! # Per-Product Stock Locks
//!
//! Serializes checkouts that touch the same product while letting checkouts
//! on disjoint products run in parallel.
//!
//! ## Lock Ordering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Checkout X: cart [B, A]        Checkout Y: cart [A, B]                │
//! │                                                                         │
//! │  sorted ids → [A, B]            sorted ids → [A, B]                    │
//! │  lock A ✓                       lock A … waits for X                   │
//! │  lock B ✓                                                               │
//! │  commit, release A and B  ───►  lock A ✓, lock B ✓                     │
//! │                                                                         │
//! │  Every checkout takes its locks in ascending product id order, so two  │
//! │  checkouts can never each hold a lock the other is waiting for.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock table only grows by one entry per distinct product and is pruned
//! of idle entries once it passes [`PRUNE_THRESHOLD`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{CheckoutError, CheckoutResult};

/// Table size at which idle lock entries are dropped.
pub const PRUNE_THRESHOLD: usize = 1024;

type Slot = Arc<AsyncMutex<()>>;

// =============================================================================
// Lock Table
// =============================================================================

/// Table of per-product async mutexes.
#[derive(Debug, Default)]
pub struct StockLocks {
    slots: Mutex<HashMap<i64, Slot>>,
}

impl StockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every product in `product_ids`, in ascending id order.
    ///
    /// Duplicate ids are locked once. Gives up with
    /// [`CheckoutError::Timeout`] if the whole set is not held within
    /// `timeout`; any locks taken so far are released.
    pub async fn acquire(
        &self,
        product_ids: impl IntoIterator<Item = i64>,
        timeout: Duration,
    ) -> CheckoutResult<ProductLockSet> {
        let mut ids: Vec<i64> = product_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let slots: Vec<Slot> = ids.iter().map(|id| self.slot(*id)).collect();
        let started = Instant::now();

        let acquire_all = async move {
            let mut guards = Vec::with_capacity(slots.len());
            for slot in slots {
                guards.push(slot.lock_owned().await);
            }
            guards
        };

        match tokio::time::timeout(timeout, acquire_all).await {
            Ok(guards) => {
                debug!(
                    products = ?ids,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Product locks acquired"
                );
                Ok(ProductLockSet {
                    product_ids: ids,
                    _guards: guards,
                })
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(products = ?ids, waited_ms, "Timed out waiting for product locks");
                Err(CheckoutError::Timeout {
                    stage: "product locks",
                    waited_ms,
                })
            }
        }
    }

    /// Number of products currently tracked.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn slot(&self, product_id: i64) -> Slot {
        let mut table = self.table();

        if table.len() >= PRUNE_THRESHOLD && !table.contains_key(&product_id) {
            // Only the table itself holds an idle entry.
            table.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        table
            .entry(product_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Slot>> {
        // The table holds no invariant a panicking holder could break.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Held Locks
// =============================================================================

/// Locks held for one checkout; released on drop.
#[derive(Debug)]
pub struct ProductLockSet {
    product_ids: Vec<i64>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ProductLockSet {
    /// Locked product ids, ascending.
    pub fn product_ids(&self) -> &[i64] {
        &self.product_ids
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_ids_sorted_and_deduplicated() {
        let locks = StockLocks::new();
        let held = locks.acquire([7, 3, 7, 1], WAIT).await.unwrap();
        assert_eq!(held.product_ids(), &[1, 3, 7]);
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_set_times_out_while_held() {
        let locks = StockLocks::new();
        let _held = locks.acquire([1, 2], WAIT).await.unwrap();

        let err = locks
            .acquire([2, 3], Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Timeout {
                stage: "product locks",
                ..
            }
        ));

        // Product 3 was released when the attempt gave up.
        assert!(locks.acquire([3], WAIT).await.is_ok());
    }

    #[tokio::test]
    async fn test_disjoint_sets_do_not_block() {
        let locks = StockLocks::new();
        let _a = locks.acquire([1], WAIT).await.unwrap();
        let b = locks.acquire([2], Duration::from_millis(30)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let locks = StockLocks::new();
        let held = locks.acquire([5], WAIT).await.unwrap();
        drop(held);
        assert!(locks.acquire([5], Duration::from_millis(30)).await.is_ok());
    }

    #[tokio::test]
    async fn test_reversed_carts_do_not_deadlock() {
        let locks = Arc::new(StockLocks::new());
        let mut handles = Vec::new();

        for i in 0..20 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let ids = if i % 2 == 0 { vec![1, 2] } else { vec![2, 1] };
                let _held = locks.acquire(ids, Duration::from_secs(5)).await?;
                tokio::task::yield_now().await;
                Ok::<_, CheckoutError>(())
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = StockLocks::new();
        let _held = locks.acquire([0], WAIT).await.unwrap();

        for id in 1..PRUNE_THRESHOLD as i64 {
            drop(locks.acquire([id], WAIT).await.unwrap());
        }
        assert_eq!(locks.len(), PRUNE_THRESHOLD);

        drop(locks.acquire([-1], WAIT).await.unwrap());
        // Only the held entry and the new one remain.
        assert_eq!(locks.len(), 2);
    }
}
