use crate::{
    db::DbPool,
    entities::product::{self, Entity as Product, PriceTier},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub business_type: Option<String>,
    pub base_price: Decimal,
    pub delivery_charges: Decimal,
    pub price_tiers: Vec<PriceTier>,
}

/// Partial update of a product's catalog fields. `stock` and `base_cost` are
/// ledger-owned and have no counterpart here.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub business_type: Option<Option<String>>,
    pub base_price: Option<Decimal>,
    pub delivery_charges: Option<Decimal>,
    pub price_tiers: Option<Vec<PriceTier>>,
}

#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send product event");
            }
        }
    }

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_product(&self, new: NewProduct) -> Result<product::Model, ServiceError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Product name cannot be empty".to_string(),
            ));
        }
        if new.base_price < Decimal::ZERO || new.delivery_charges < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Prices cannot be negative".to_string(),
            ));
        }
        validate_tiers(&new.price_tiers)?;

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            business_type: Set(new.business_type),
            name: Set(name),
            base_price: Set(new.base_price),
            base_cost: Set(Decimal::ZERO),
            delivery_charges: Set(new.delivery_charges),
            stock: Set(0),
            price_tiers: Set(serde_json::to_value(&new.price_tiers)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        let created = model
            .insert(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        info!(product_id = %created.id, "Product created");
        self.emit(Event::ProductCreated(created.id)).await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(term) = search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query
                .filter(Condition::all().add(product::Column::Name.contains(term)));
        }

        let paginator = query.paginate(&*self.db_pool, per_page.clamp(1, 100));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let products = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((products, total))
    }

    /// Updates catalog fields only; the denormalized stock aggregates are out
    /// of reach by construction.
    #[instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        id: Uuid,
        update: ProductUpdate,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(id).await?;
        let mut active: product::ActiveModel = existing.into();

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Product name cannot be empty".to_string(),
                ));
            }
            active.name = Set(name);
        }
        if let Some(business_type) = update.business_type {
            active.business_type = Set(business_type);
        }
        if let Some(base_price) = update.base_price {
            if base_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Prices cannot be negative".to_string(),
                ));
            }
            active.base_price = Set(base_price);
        }
        if let Some(delivery_charges) = update.delivery_charges {
            if delivery_charges < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Prices cannot be negative".to_string(),
                ));
            }
            active.delivery_charges = Set(delivery_charges);
        }
        if let Some(tiers) = update.price_tiers {
            validate_tiers(&tiers)?;
            active.price_tiers = Set(serde_json::to_value(&tiers)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?);
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        info!(product_id = %updated.id, "Product updated");
        self.emit(Event::ProductUpdated(updated.id)).await;
        Ok(updated)
    }
}

fn validate_tiers(tiers: &[PriceTier]) -> Result<(), ServiceError> {
    let mut seen = HashSet::new();
    for tier in tiers {
        if tier.id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Price tier id cannot be empty".to_string(),
            ));
        }
        if !seen.insert(tier.id.as_str()) {
            return Err(ServiceError::ValidationError(format!(
                "Duplicate price tier id '{}'",
                tier.id
            )));
        }
        if tier.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Price tier '{}' has a negative price",
                tier.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tier_validation_rejects_duplicates_and_negatives() {
        let ok = vec![
            PriceTier {
                id: "retail".into(),
                label: "Retail".into(),
                price: dec!(10),
            },
            PriceTier {
                id: "wholesale".into(),
                label: "Wholesale".into(),
                price: dec!(8),
            },
        ];
        assert!(validate_tiers(&ok).is_ok());

        let dup = vec![ok[0].clone(), ok[0].clone()];
        assert!(validate_tiers(&dup).is_err());

        let negative = vec![PriceTier {
            id: "retail".into(),
            label: "Retail".into(),
            price: dec!(-1),
        }];
        assert!(validate_tiers(&negative).is_err());
    }
}
