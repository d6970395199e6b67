use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Persisted order with its settlement configuration and computed financials.
///
/// `final_amount`, `profit` and `partial_remaining_amount` are computed-only:
/// they are derived from the order content and configuration at write time and
/// never accepted from clients. The nullable `selling_price`/`cost_price`/
/// `quantity` triple carries legacy single-line orders that have no line rows.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub status: String,
    pub payment_status: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub tax_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub order_discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub delivery_charge: Decimal,
    pub delivery_paid_by_customer: bool,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub partial_paid_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub selling_price: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub cost_price: Option<Decimal>,
    pub quantity: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub final_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub profit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub partial_remaining_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::order_line::Entity")]
    OrderLines,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    Partial,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Unpaid => "Unpaid",
            PaymentStatus::Partial => "Partial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Paid" => Some(PaymentStatus::Paid),
            "Unpaid" => Some(PaymentStatus::Unpaid),
            "Partial" => Some(PaymentStatus::Partial),
            _ => None,
        }
    }
}
