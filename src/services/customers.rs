use crate::{
    db::DbPool,
    entities::customer::{self, Entity as Customer},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct CustomerDetails {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let paginator = Customer::find()
            .order_by_desc(customer::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page.clamp(1, 100));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let customers = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((customers, total))
    }
}

/// Finds the customer by phone or creates one, inside the caller's
/// transaction. An existing record only gains fields it was missing: incoming
/// details never overwrite a stored name, email or address.
pub(crate) async fn resolve_or_create_in_txn<C: ConnectionTrait>(
    conn: &C,
    details: &CustomerDetails,
) -> Result<customer::Model, ServiceError> {
    let phone = details.phone.trim();
    if phone.is_empty() {
        return Err(ServiceError::ValidationError(
            "Customer phone cannot be empty".to_string(),
        ));
    }

    let existing = Customer::find()
        .filter(customer::Column::Phone.eq(phone))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    match existing {
        Some(found) => {
            let fill_name = found.name.is_none() && details.name.is_some();
            let fill_email = found.email.is_none() && details.email.is_some();
            let fill_address = found.address.is_none() && details.address.is_some();
            if !(fill_name || fill_email || fill_address) {
                return Ok(found);
            }

            let mut active: customer::ActiveModel = found.into();
            if fill_name {
                active.name = Set(details.name.clone());
            }
            if fill_email {
                active.email = Set(details.email.clone());
            }
            if fill_address {
                active.address = Set(details.address.clone());
            }
            active.updated_at = Set(Some(Utc::now()));
            active.update(conn).await.map_err(ServiceError::db_error)
        }
        None => {
            let model = customer::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(details.name.clone()),
                phone: Set(phone.to_string()),
                email: Set(details.email.clone()),
                address: Set(details.address.clone()),
                created_at: Set(Utc::now()),
                updated_at: Set(None),
            };
            let created = model.insert(conn).await.map_err(ServiceError::db_error)?;
            info!(customer_id = %created.id, "Customer created");
            Ok(created)
        }
    }
}
