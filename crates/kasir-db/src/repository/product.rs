//! # Product Repository (Inventory Store)
//!
//! Database operations for products and their stock counters.
//!
//! ## Key Operations
//! - Lookup by id (checkout) and by code (scanner)
//! - Conditional stock decrement (checkout commit)
//! - Catalog inserts and restocks (seed, tooling)
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Decrement Strategy                             │
//! │                                                                         │
//! │  ❌ WRONG: read, compute, write back                                    │
//! │     SELECT stock → 1;  UPDATE products SET stock = 0                    │
//! │     Two cashiers both read 1, both write 0 → two units sold             │
//! │                                                                         │
//! │  ✅ CORRECT: guarded delta in a single statement                        │
//! │     UPDATE products SET stock = stock - 1                               │
//! │     WHERE id = ? AND stock >= 1                                         │
//! │     0 rows → somebody got there first → Insufficient                    │
//! │                                                                         │
//! │  Holds even against writers outside this process.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The free functions take a `&mut SqliteConnection` so the checkout can run
//! them inside its own transaction (`&mut *tx`).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kasir_core::validation::{
    validate_price, validate_product_code, validate_product_name, validate_stock,
};
use kasir_core::{NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, code, name, price_cents, stock, created_at, updated_at";

// =============================================================================
// Connection-level Operations
// =============================================================================

/// Outcome of a conditional stock decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockDecrement {
    /// Stock was taken; the product as it is after the decrement.
    Applied(Product),
    /// Less stock on hand than requested; nothing changed.
    Insufficient { available: i64 },
}

/// Reads one product on the given connection.
pub async fn fetch_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;

    Ok(product)
}

/// Takes `quantity` units from product `id` if at least that many are in stock.
///
/// ## Returns
/// * `Ok(Applied(product))` - Stock decremented
/// * `Ok(Insufficient { available })` - Not enough stock, row untouched
/// * `Err(DbError::NotFound)` - No such product
pub async fn decrement_stock_if_available(
    conn: &mut SqliteConnection,
    id: i64,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<StockDecrement> {
    debug!(product_id = id, quantity, "Conditional stock decrement");

    let updated = sqlx::query_as::<_, Product>(&format!(
        "UPDATE products \
         SET stock = stock - ?2, updated_at = ?3 \
         WHERE id = ?1 AND stock >= ?2 \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(quantity)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(product) = updated {
        return Ok(StockDecrement::Applied(product));
    }

    match fetch_by_id(conn, id).await? {
        Some(product) => Ok(StockDecrement::Insufficient {
            available: product.stock,
        }),
        None => Err(DbError::not_found("Product", id)),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let indomie = repo.get_by_code("SNACK001").await?;
/// let all = repo.list(100).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id).await
    }

    /// Gets a product by its scannable code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE code = ?1"
        ))
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists products sorted by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product with its assigned id
    /// * `Err(DbError::UniqueViolation)` - Code already exists
    /// * `Err(DbError::Validation)` - Malformed field
    pub async fn insert(&self, product: &NewProduct) -> DbResult<Product> {
        validate_product_code(&product.code)?;
        validate_product_name(&product.name)?;
        validate_price(product.price)?;
        validate_stock(product.stock)?;

        debug!(code = %product.code, "Inserting product");

        let now = Utc::now();
        let inserted = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (code, name, price_cents, stock, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product.code.trim())
        .bind(product.name.trim())
        .bind(product.price)
        .bind(product.stock)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.code),
            other => other,
        })?;

        Ok(inserted)
    }

    /// Sets the absolute stock level (stock count, catalog tooling).
    pub async fn set_stock(&self, id: i64, stock: i64) -> DbResult<Product> {
        validate_stock(stock)?;

        debug!(product_id = id, stock, "Setting stock");

        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(stock)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Adds `delta` units (negative to remove) to stock.
    ///
    /// Fails with `CheckViolation` rather than let stock drop below zero.
    pub async fn adjust_stock(&self, id: i64, delta: i64) -> DbResult<Product> {
        debug!(product_id = id, delta, "Adjusting stock");

        sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Counts products (for diagnostics and seeding).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use kasir_core::Money;

    async fn db_with(products: &[(&str, i64, i64)]) -> (Database, Vec<Product>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut inserted = Vec::new();
        for (code, price, stock) in products {
            let product = db
                .products()
                .insert(&NewProduct {
                    code: code.to_string(),
                    name: format!("Product {code}"),
                    price: Money::from_minor(*price),
                    stock: *stock,
                })
                .await
                .unwrap();
            inserted.push(product);
        }
        (db, inserted)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (db, inserted) = db_with(&[("SNACK001", 3500, 100)]).await;
        let repo = db.products();

        let by_id = repo.get_by_id(inserted[0].id).await.unwrap().unwrap();
        let by_code = repo.get_by_code("SNACK001").await.unwrap().unwrap();

        assert_eq!(by_id, by_code);
        assert_eq!(by_id.price, Money::from_minor(3500));
        assert_eq!(by_id.stock, 100);
        assert!(repo.get_by_id(9999).await.unwrap().is_none());
        assert!(repo.get_by_code("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected() {
        let (db, _) = db_with(&[("DRINK001", 4000, 75)]).await;

        let err = db
            .products()
            .insert(&NewProduct {
                code: "DRINK001".into(),
                name: "Another".into(),
                price: Money::from_minor(1),
                stock: 1,
            })
            .await
            .unwrap_err();

        assert!(err.is_unique_violation_on("code"), "got {err:?}");
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected() {
        let (db, _) = db_with(&[]).await;
        let err = db
            .products()
            .insert(&NewProduct {
                code: "BAD CODE".into(),
                name: "x".into(),
                price: Money::from_minor(1),
                stock: 1,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let (db, inserted) = db_with(&[("SNACK002", 8000, 1)]).await;
        let id = inserted[0].id;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = decrement_stock_if_available(&mut conn, id, 1, Utc::now())
            .await
            .unwrap();
        assert!(matches!(first, StockDecrement::Applied(ref p) if p.stock == 0));

        let second = decrement_stock_if_available(&mut conn, id, 1, Utc::now())
            .await
            .unwrap();
        assert_eq!(second, StockDecrement::Insufficient { available: 0 });

        let missing = decrement_stock_if_available(&mut conn, 404, 1, Utc::now()).await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_restock_never_goes_negative() {
        let (db, inserted) = db_with(&[("TISSUE001", 12000, 2)]).await;
        let repo = db.products();
        let id = inserted[0].id;

        assert_eq!(repo.adjust_stock(id, 5).await.unwrap().stock, 7);
        assert!(matches!(
            repo.adjust_stock(id, -8).await,
            Err(DbError::CheckViolation { .. })
        ));
        assert_eq!(repo.set_stock(id, 0).await.unwrap().stock, 0);
        assert!(repo.set_stock(id, -1).await.is_err());
        assert!(matches!(
            repo.set_stock(404, 1).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_sorted_by_name() {
        let (db, _) = db_with(&[("B", 1, 1), ("A", 1, 1), ("C", 1, 1)]).await;
        let names: Vec<String> = db
            .products()
            .list(10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(names, vec!["Product A", "Product B", "Product C"]);
        assert_eq!(db.products().count().await.unwrap(), 3);
    }
}
