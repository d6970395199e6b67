use crate::{
    db::DbPool,
    entities::warehouse::{self, Entity as Warehouse},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct WarehouseService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl WarehouseService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_warehouse(
        &self,
        name: String,
        location: Option<String>,
    ) -> Result<warehouse::Model, ServiceError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Warehouse name cannot be empty".to_string(),
            ));
        }

        let model = warehouse::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            location: Set(location),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        };
        let created = model
            .insert(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        info!(warehouse_id = %created.id, "Warehouse created");
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::WarehouseCreated(created.id)).await {
                warn!(error = %e, "Failed to send warehouse event");
            }
        }
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_warehouse(&self, id: Uuid) -> Result<warehouse::Model, ServiceError> {
        Warehouse::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Warehouse {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        Warehouse::find()
            .order_by_asc(warehouse::Column::Name)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}
