//! End-to-end checkout, ledger and report behavior through `PosEngine`.

use chrono::{Duration, Utc};
use kasir_core::{CheckoutLine, Money, NewProduct, Product};
use kasir_db::{Database, DbConfig};
use kasir_engine::{CheckoutError, EngineConfig, PosEngine, QueryError};
use uuid::Uuid;

async fn engine() -> PosEngine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    PosEngine::with_database(db, &EngineConfig::default())
}

async fn add_product(engine: &PosEngine, code: &str, name: &str, price: i64, stock: i64) -> Product {
    engine
        .database()
        .products()
        .insert(&NewProduct {
            code: code.into(),
            name: name.into(),
            price: Money::from_minor(price),
            stock,
        })
        .await
        .unwrap()
}

async fn stock_of(engine: &PosEngine, id: i64) -> i64 {
    engine
        .database()
        .products()
        .get_by_id(id)
        .await
        .unwrap()
        .unwrap()
        .stock
}

#[tokio::test]
async fn sells_until_stock_runs_out() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 100).await;
    let b = add_product(&engine, "SNACK002", "Chitato BBQ", 8000, 1).await;

    let txn = engine
        .checkout(&[CheckoutLine::new(a.id, 2), CheckoutLine::new(b.id, 1)])
        .await
        .unwrap();

    assert_eq!(txn.total_amount, Money::from_minor(15_000));
    assert_eq!(txn.item_count, 3);
    assert!(txn.is_balanced());
    assert_eq!(stock_of(&engine, a.id).await, 98);
    assert_eq!(stock_of(&engine, b.id).await, 0);

    let err = engine
        .checkout(&[CheckoutLine::new(b.id, 1)])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CheckoutError::InsufficientStock {
            product_id: b.id,
            available: 0,
            requested: 1
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn failed_checkout_changes_nothing() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 100).await;
    let b = add_product(&engine, "SNACK002", "Chitato BBQ", 8000, 1).await;

    let err = engine
        .checkout(&[CheckoutLine::new(a.id, 2), CheckoutLine::new(b.id, 999_999)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CheckoutError::InsufficientStock { product_id, .. } if product_id == b.id
    ));
    assert_eq!(stock_of(&engine, a.id).await, 100);
    assert_eq!(stock_of(&engine, b.id).await, 1);
    assert_eq!(engine.database().ledger().count().await.unwrap(), 0);
}

#[tokio::test]
async fn rejects_empty_and_unknown() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 10).await;

    assert_eq!(engine.checkout(&[]).await, Err(CheckoutError::EmptyCart));

    let err = engine
        .checkout(&[CheckoutLine::new(a.id, 1), CheckoutLine::new(9_999, 1)])
        .await
        .unwrap_err();
    assert_eq!(err, CheckoutError::ProductNotFound { product_id: 9_999 });
    assert_eq!(stock_of(&engine, a.id).await, 10);

    let err = engine
        .checkout(&[CheckoutLine::new(a.id, -3)])
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)));
}

#[tokio::test]
async fn snapshots_survive_catalog_changes() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 10).await;

    let txn = engine.checkout(&[CheckoutLine::new(a.id, 3)]).await.unwrap();

    // Restock does not rewrite history.
    engine
        .database()
        .products()
        .set_stock(a.id, 500)
        .await
        .unwrap();

    let stored = engine.get_transaction(txn.id).await.unwrap().unwrap();
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].product_name, "Indomie Goreng");
    assert_eq!(stored.items[0].price_per_unit, Money::from_minor(3500));
    assert_eq!(stored.items[0].subtotal, Money::from_minor(10_500));
    assert_eq!(stored.total_amount, txn.total_amount);

    assert!(engine.get_transaction(txn.id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn idempotent_checkout_moves_stock_once() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 10).await;
    let key = Uuid::new_v4();

    let first = engine
        .checkout_idempotent(key, &[CheckoutLine::new(a.id, 4)])
        .await
        .unwrap();
    let again = engine
        .checkout_idempotent(key, &[CheckoutLine::new(a.id, 4)])
        .await
        .unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(stock_of(&engine, a.id).await, 6);
    assert_eq!(engine.database().ledger().count().await.unwrap(), 1);

    // A fresh key is a new sale.
    engine
        .checkout_idempotent(Uuid::new_v4(), &[CheckoutLine::new(a.id, 4)])
        .await
        .unwrap();
    assert_eq!(stock_of(&engine, a.id).await, 2);
}

#[tokio::test]
async fn lists_newest_first() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 10).await;

    let mut ids = Vec::new();
    for qty in 1..=3 {
        ids.push(engine.checkout(&[CheckoutLine::new(a.id, qty)]).await.unwrap().id);
    }

    let listed: Vec<i64> = engine
        .list_transactions(None, None)
        .await
        .unwrap()
        .iter()
        .map(|txn| txn.id)
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);

    let page = engine.list_transactions(Some(1), Some(1)).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, ids[1]);
    assert_eq!(page[0].items.len(), 1);

    assert!(matches!(
        engine.list_transactions(Some(0), None).await,
        Err(QueryError::Validation(_))
    ));
}

#[tokio::test]
async fn reports_are_repeatable_and_consistent() {
    let engine = engine().await;
    let a = add_product(&engine, "SNACK001", "Indomie Goreng", 3500, 100).await;
    let b = add_product(&engine, "DRINK001", "Aqua 600ml", 4000, 100).await;

    engine
        .checkout(&[CheckoutLine::new(a.id, 2), CheckoutLine::new(b.id, 1)])
        .await
        .unwrap();
    engine.checkout(&[CheckoutLine::new(b.id, 5)]).await.unwrap();

    let today = Utc::now().date_naive();
    let first = engine.daily_report_in(today, &Utc).await.unwrap();
    let second = engine.daily_report_in(today, &Utc).await.unwrap();
    assert_eq!(first, second);

    assert_eq!(first.summary.transaction_count, 2);
    assert_eq!(first.summary.total_sales, Money::from_minor(31_000));
    assert_eq!(first.summary.items_sold, 8);
    assert_eq!(first.summary.average_transaction_value, Money::from_minor(15_500));
    assert_eq!(first.top_products[0].product_id, b.id);
    assert_eq!(first.top_products[0].quantity_sold, 6);
    assert_eq!(first.top_products[0].revenue, Money::from_minor(24_000));

    let range = engine.range_report_in(today, today, &Utc).await.unwrap();
    assert_eq!(range.total_sales, first.summary.total_sales);
    assert_eq!(range.transaction_count, 2);

    let yesterday = today - Duration::days(1);
    let empty = engine.daily_report_in(yesterday, &Utc).await.unwrap();
    assert_eq!(empty.summary.transaction_count, 0);

    let json = serde_json::to_value(&range).unwrap();
    assert_eq!(json["totalSales"], 31_000);
    assert_eq!(json["averageDaily"], 31_000);
}

#[tokio::test]
async fn looks_up_products_by_code() {
    let engine = engine().await;
    engine.seed().await.unwrap();

    let aqua = engine.lookup_product("DRINK001").await.unwrap().unwrap();
    assert_eq!(aqua.name, "Aqua 600ml");
    assert!(engine.lookup_product("NOPE").await.unwrap().is_none());

    let products = engine.list_products(None).await.unwrap();
    assert!(products.windows(2).all(|w| w[0].name <= w[1].name));
}
