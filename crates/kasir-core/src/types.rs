//! # Domain Types
//!
//! Core domain types shared by the inventory store, the ledger and reporting.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  Transaction    │   │ TransactionItem │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │◄┈┈│                 │◆──│  product_id ┈┈┈►│       │
//! │  │  code (unique)  │   │  id (monotonic) │   │  product_name * │       │
//! │  │  name           │   │  created_at     │   │  price_per_unit*│       │
//! │  │  price          │   │  total_amount   │   │  quantity       │       │
//! │  │  stock (>= 0)   │   │  item_count     │   │  subtotal       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ◆── owns (created together, never deleted)                            │
//! │  ┈┈► reference by id only      * snapshot frozen at commit             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in the inventory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Stable identifier, also the canonical lock-ordering key.
    pub id: i64,

    /// Unique scannable key (barcode or QR payload).
    pub code: String,

    /// Display name, copied onto line items at sale time.
    pub name: String,

    /// Unit price in minor units.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "price_cents"))]
    pub price: Money,

    /// Units on hand. Never negative.
    pub stock: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Checks whether `quantity` units can be taken from stock.
    #[inline]
    pub fn can_fulfil(&self, quantity: i64) -> bool {
        quantity <= self.stock
    }
}

/// Fields needed to register a product in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub code: String,
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

// =============================================================================
// Checkout Input
// =============================================================================

/// One requested line of a checkout: which product and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLine {
    pub product_id: i64,
    pub quantity: i64,
}

impl CheckoutLine {
    pub const fn new(product_id: i64, quantity: i64) -> Self {
        CheckoutLine {
            product_id,
            quantity,
        }
    }
}

impl From<(i64, i64)> for CheckoutLine {
    fn from((product_id, quantity): (i64, i64)) -> Self {
        CheckoutLine::new(product_id, quantity)
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A committed sale. Written once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Assigned by the ledger on commit; strictly increasing.
    pub id: i64,

    /// Commit timestamp.
    pub created_at: DateTime<Utc>,

    /// Sum of line subtotals.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "total_amount_cents"))]
    pub total_amount: Money,

    /// Sum of line quantities.
    pub item_count: i64,

    /// Caller-supplied deduplication token, if the checkout carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Line items in cart order.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<TransactionItem>,
}

impl Transaction {
    /// Checks the ledger invariant:
    /// `Σ subtotal == total_amount` and `Σ quantity == item_count`.
    pub fn is_balanced(&self) -> bool {
        let subtotal: Money = self.items.iter().map(|item| item.subtotal).sum();
        let quantity: i64 = self.items.iter().map(|item| item.quantity).sum();
        subtotal == self.total_amount && quantity == self.item_count
    }
}

// =============================================================================
// Transaction Item
// =============================================================================

/// A line item of a committed transaction.
///
/// Uses the snapshot pattern: `product_name` and `price_per_unit` are copied
/// at commit time and never follow later catalog edits. `product_id` is a
/// plain reference; the product may since have been renamed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub transaction_id: i64,
    pub line_no: i64,
    pub product_id: i64,
    /// Product name at time of sale (frozen).
    pub product_name: String,
    pub quantity: i64,
    /// Unit price at time of sale (frozen).
    #[cfg_attr(feature = "sqlx", sqlx(rename = "price_per_unit_cents"))]
    pub price_per_unit: Money,
    /// `price_per_unit × quantity`.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "subtotal_cents"))]
    pub subtotal: Money,
}

// =============================================================================
// Listing Order
// =============================================================================

/// Ordering of ledger listings by commit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    #[default]
    Descending,
}

impl SortOrder {
    /// SQL keyword for this ordering.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
