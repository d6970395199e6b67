use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A discrete cost lot inside an allocation. `cost_price` and `added_at` are
/// immutable once created; `quantity` only ever decreases (the row is removed
/// when it reaches zero). Batch ids are UUID v7 so the FIFO ordering
/// `(added_at, id)` has a total, collision-proof tie-break.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub allocation_id: Uuid,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cost_price: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_allocation::Entity",
        from = "Column::AllocationId",
        to = "super::stock_allocation::Column::Id"
    )]
    StockAllocation,
}

impl Related<super::stock_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAllocation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
