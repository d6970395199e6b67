use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::{env, sync::Arc};
use stocklot_api::{
    db::{create_db_pool, run_migrations, DbPool},
    entities::{product, warehouse},
};
use uuid::Uuid;

static SETUP_LOCK: std::sync::OnceLock<tokio::sync::Mutex<()>> = std::sync::OnceLock::new();

/// Shared in-memory database, migrated. Setup is serialized so concurrent
/// tests never race the schema creation; tests isolate themselves through
/// unique row ids rather than separate databases.
pub async fn setup_db() -> Arc<DbPool> {
    let _guard = SETUP_LOCK
        .get_or_init(|| tokio::sync::Mutex::new(()))
        .lock()
        .await;
    env::set_var("APP__DATABASE_URL", "sqlite::memory:?cache=shared");
    let pool = Arc::new(create_db_pool().await.expect("Failed to create DB pool"));
    run_migrations(pool.as_ref())
        .await
        .expect("Failed to run migrations");
    pool
}

pub async fn create_test_product(db: &DbPool, name: &str) -> product::Model {
    create_test_tiered_product(db, name, &[]).await
}

pub async fn create_test_tiered_product(
    db: &DbPool,
    name: &str,
    tier_ids: &[&str],
) -> product::Model {
    let tiers: Vec<serde_json::Value> = tier_ids
        .iter()
        .map(|id| serde_json::json!({ "id": id, "label": id, "price": "0" }))
        .collect();
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        business_type: Set(None),
        name: Set(name.to_string()),
        base_price: Set(Decimal::ZERO),
        base_cost: Set(Decimal::ZERO),
        delivery_charges: Set(Decimal::ZERO),
        stock: Set(0),
        price_tiers: Set(serde_json::Value::Array(tiers)),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("Failed to create product")
}

pub async fn create_test_warehouse(db: &DbPool, name: &str) -> warehouse::Model {
    warehouse::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        location: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("Failed to create warehouse")
}
