//! # Demo Catalog
//!
//! The starter product set loaded by `kasir seed` and the `seed` binary.
//! Stock levels are chosen so that a fresh database shows plenty, low and
//! sold-out products side by side.

use tracing::info;

use crate::error::DbResult;
use crate::pool::Database;
use kasir_core::{Money, NewProduct};

/// `(code, name, price, stock)`
pub const SEED_PRODUCTS: &[(&str, &str, i64, i64)] = &[
    ("SNACK001", "Indomie Goreng", 3500, 100),
    ("SNACK002", "Chitato BBQ", 8000, 50),
    ("DRINK001", "Aqua 600ml", 4000, 75),
    ("DRINK002", "Teh Botol Sosro", 5000, 60),
    ("CANDY001", "Kopiko Coffee Candy", 2000, 120),
    ("BISCUIT001", "Oreo Original", 10000, 40),
    ("MILK001", "Susu Ultra Coklat", 6500, 30),
    ("BREAD001", "Roti Tawar Sari Roti", 15000, 25),
    ("SOAP001", "Sabun Lifebuoy", 7000, 45),
    ("SHAMPOO001", "Pantene Sachet", 1500, 8),
    ("TISSUE001", "Tisu Paseo", 12000, 2),
    ("EGGS001", "Telur Ayam (10 butir)", 25000, 0),
];

/// What a seeding run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Inserted(usize),
    /// The catalog already had this many products; nothing was written.
    Skipped(i64),
}

/// Loads [`SEED_PRODUCTS`] into an empty catalog.
pub async fn seed_catalog(db: &Database) -> DbResult<SeedOutcome> {
    let existing = db.products().count().await?;
    if existing > 0 {
        info!(existing, "Catalog not empty, skipping seed");
        return Ok(SeedOutcome::Skipped(existing));
    }

    let repo = db.products();
    for (code, name, price, stock) in SEED_PRODUCTS {
        repo.insert(&NewProduct {
            code: code.to_string(),
            name: name.to_string(),
            price: Money::from_minor(*price),
            stock: *stock,
        })
        .await?;
    }

    info!(count = SEED_PRODUCTS.len(), "Seeded catalog");
    Ok(SeedOutcome::Inserted(SEED_PRODUCTS.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;

    #[tokio::test]
    async fn test_seed_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert_eq!(
            seed_catalog(&db).await.unwrap(),
            SeedOutcome::Inserted(SEED_PRODUCTS.len())
        );
        assert_eq!(
            seed_catalog(&db).await.unwrap(),
            SeedOutcome::Skipped(SEED_PRODUCTS.len() as i64)
        );

        let eggs = db.products().get_by_code("EGGS001").await.unwrap().unwrap();
        assert_eq!(eggs.stock, 0);
        assert_eq!(eggs.price, Money::from_minor(25000));
    }
}
