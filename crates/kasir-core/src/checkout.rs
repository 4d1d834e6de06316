//! # Checkout Planning
//!
//! Turns a validated cart plus the products observed for it into the exact
//! set of rows a checkout commits.
//!
//! ## Plan Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkout Plan                                    │
//! │                                                                         │
//! │  cart [(A,2), (B,1), (A,1)]                                             │
//! │        │                                                                │
//! │        ▼  add_line(product, qty)   (input order)                        │
//! │  ┌──────────────────────────────────────────────────────────────┐      │
//! │  │ line 1: A  qty 2  @3500  = 7000     demand[A] = 2            │      │
//! │  │ line 2: B  qty 1  @8000  = 8000     demand[B] = 1            │      │
//! │  │ line 3: A  qty 1  @3500  = 3500     demand[A] = 3  ≤ stock?  │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! │        │                                                                │
//! │        ├──► lines()       → ledger rows (snapshots)                     │
//! │        ├──► total_amount  = Σ subtotal = 18500                          │
//! │        ├──► item_count    = Σ quantity = 4                              │
//! │        └──► decrements()  → [(A,3), (B,1)]  ascending product id        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Demand is cumulative per product: a cart that names the same product on
//! two lines is checked against stock for the combined quantity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Product, TransactionItem};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

// =============================================================================
// Cart Limits
// =============================================================================

/// Bounds on the shape of a single checkout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLimits {
    pub max_lines: usize,
    pub max_line_quantity: i64,
}

impl Default for CartLimits {
    fn default() -> Self {
        CartLimits {
            max_lines: MAX_CART_LINES,
            max_line_quantity: MAX_LINE_QUANTITY,
        }
    }
}

// =============================================================================
// Planned Line
// =============================================================================

/// One line of a checkout as it will be written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedLine {
    /// 1-based position in the cart.
    pub line_no: i64,
    pub product_id: i64,
    /// Name observed during validation (snapshot).
    pub product_name: String,
    pub quantity: i64,
    /// Price observed during validation (snapshot).
    pub price_per_unit: Money,
    pub subtotal: Money,
}

impl PlannedLine {
    /// Materializes the ledger row once the transaction id is known.
    pub fn to_item(&self, transaction_id: i64) -> TransactionItem {
        TransactionItem {
            transaction_id,
            line_no: self.line_no,
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            price_per_unit: self.price_per_unit,
            subtotal: self.subtotal,
        }
    }
}

// =============================================================================
// Checkout Plan
// =============================================================================

/// Accumulates validated lines, totals and per-product demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutPlan {
    lines: Vec<PlannedLine>,
    total_amount: Money,
    item_count: i64,
    demand: BTreeMap<i64, i64>,
}

impl CheckoutPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(lines: usize) -> Self {
        CheckoutPlan {
            lines: Vec::with_capacity(lines),
            ..Self::default()
        }
    }

    /// Adds a cart line priced and named from `product`.
    ///
    /// Fails with `InsufficientStock` when the cumulative quantity requested
    /// for this product exceeds `product.stock`; the plan is left unchanged.
    ///
    /// ## Example
    /// ```rust
    /// use chrono::Utc;
    /// use kasir_core::{CheckoutPlan, CoreError, Money, Product};
    ///
    /// let b = Product {
    ///     id: 2,
    ///     code: "SNACK002".into(),
    ///     name: "Chitato BBQ".into(),
    ///     price: Money::from_minor(8000),
    ///     stock: 1,
    ///     created_at: Utc::now(),
    ///     updated_at: Utc::now(),
    /// };
    ///
    /// let mut plan = CheckoutPlan::new();
    /// plan.add_line(&b, 1).unwrap();
    /// assert_eq!(
    ///     plan.add_line(&b, 1),
    ///     Err(CoreError::InsufficientStock { product_id: 2, available: 1, requested: 2 })
    /// );
    /// ```
    pub fn add_line(&mut self, product: &Product, quantity: i64) -> CoreResult<&PlannedLine> {
        let already = self.demand.get(&product.id).copied().unwrap_or(0);
        let requested = already
            .checked_add(quantity)
            .ok_or(CoreError::AmountOverflow { context: "quantity" })?;

        if !product.can_fulfil(requested) {
            return Err(CoreError::InsufficientStock {
                product_id: product.id,
                available: product.stock,
                requested,
            });
        }

        let subtotal = product
            .price
            .checked_mul_quantity(quantity)
            .ok_or(CoreError::AmountOverflow { context: "subtotal" })?;
        let total_amount = self
            .total_amount
            .checked_add(subtotal)
            .ok_or(CoreError::AmountOverflow { context: "total amount" })?;
        let item_count = self
            .item_count
            .checked_add(quantity)
            .ok_or(CoreError::AmountOverflow { context: "item count" })?;

        self.total_amount = total_amount;
        self.item_count = item_count;
        self.demand.insert(product.id, requested);

        let line_no = self.lines.len() as i64 + 1;
        self.lines.push(PlannedLine {
            line_no,
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            price_per_unit: product.price,
            subtotal,
        });

        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Lines in cart order.
    pub fn lines(&self) -> &[PlannedLine] {
        &self.lines
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn item_count(&self) -> i64 {
        self.item_count
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Quantity to take from each product, ascending by product id.
    ///
    /// This is the order stock rows are touched in during commit.
    pub fn decrements(&self) -> Vec<(i64, i64)> {
        self.demand.iter().map(|(&id, &qty)| (id, qty)).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
