use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Catalog product. `stock` and `base_cost` are denormalized aggregates owned
/// by the stock ledger; they are recomputed inside every mutating transaction
/// and never written by catalog callers.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_type: Option<String>,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub base_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub base_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub delivery_charges: Decimal,
    pub stock: i32,
    pub price_tiers: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_allocation::Entity")]
    StockAllocations,
}

impl Related<super::stock_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// One entry of a product's ordered price-tier list, stored in the
/// `price_tiers` JSON column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    pub id: String,
    pub label: String,
    pub price: Decimal,
}

impl Model {
    /// Parses the `price_tiers` JSON column. Malformed or missing data yields
    /// an empty list rather than an error; tiers are advisory for pricing.
    pub fn tiers(&self) -> Vec<PriceTier> {
        serde_json::from_value(self.price_tiers.clone()).unwrap_or_default()
    }

    /// True when `tier_id` names one of the product's price tiers.
    pub fn has_tier(&self, tier_id: &str) -> bool {
        self.tiers().iter().any(|t| t.id == tier_id)
    }
}
