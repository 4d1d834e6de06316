//! # Repository Module
//!
//! Database repository implementations for Kasir POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Checkout commit (one sqlx Transaction)                                │
//! │       │                                                                 │
//! │       ├── product::decrement_stock_if_available(&mut tx, id, qty)      │
//! │       └── ledger::append(&mut tx, plan, created_at, key)               │
//! │                                                                         │
//! │  Everything else (own pooled connection per call)                      │
//! │       ├── ProductRepository  get_by_id, get_by_code, list, insert      │
//! │       └── LedgerRepository   get, list, list_by_time_range             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection-level functions are free functions over `&mut SqliteConnection`
//! so several of them can share one database transaction.

pub mod ledger;
pub mod product;
