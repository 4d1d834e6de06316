//! # kasir-core: Pure Checkout Logic for Kasir POS
//!
//! This crate holds every rule the checkout engine has to get right, as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kasir POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 kasir-engine (coordinator)                      │   │
//! │  │    checkout, get_transaction, daily_report, range_report        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kasir-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ checkout  │  │  report   │  │   │
//! │  │   │  Product  │  │   Money   │  │   Plan    │  │  Window   │  │   │
//! │  │   │   Txn     │  │ (integer) │  │ Snapshots │  │  Summary  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kasir-db (Database Layer)                    │   │
//! │  │          inventory store, transaction ledger, migrations        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Product, Transaction, TransactionItem, CheckoutLine
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`checkout`] - Cart validation and the snapshot plan committed by a checkout
//! - [`report`] - Report windows and sales aggregation
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use kasir_core::money::Money;
//!
//! let price = Money::from_minor(3500);
//! let subtotal = price.checked_mul_quantity(2).unwrap();
//! assert_eq!(subtotal.minor(), 7000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod checkout;
pub mod error;
pub mod money;
pub mod report;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use checkout::{CartLimits, CheckoutPlan, PlannedLine};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use report::{DailyReport, RangeReport, ReportWindow, SalesSummary, TopProduct};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted in a single checkout.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity accepted on a single checkout line.
///
/// Large enough that an over-sized request is reported as insufficient
/// stock rather than rejected as malformed input.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Number of products listed in a daily report's ranking.
pub const TOP_PRODUCTS_LIMIT: usize = 10;

/// Default page size for transaction listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page a single listing call may request.
pub const MAX_PAGE_SIZE: u32 = 500;
