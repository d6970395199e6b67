use crate::{entities::warehouse, errors::ServiceError, AppState};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/:id", get(get_warehouse))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateWarehouseRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub location: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouses",
    request_body = CreateWarehouseRequest,
    responses(
        (status = 201, description = "Warehouse created"),
        (status = 400, description = "Invalid warehouse data")
    )
)]
pub async fn create_warehouse(
    State(state): State<AppState>,
    Json(request): Json<CreateWarehouseRequest>,
) -> Result<(axum::http::StatusCode, Json<warehouse::Model>), ServiceError> {
    request.validate()?;
    let created = state
        .services
        .warehouses
        .create_warehouse(request.name, request.location)
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouses/{id}",
    params(("id" = Uuid, Path, description = "Warehouse id")),
    responses(
        (status = 200, description = "Warehouse found"),
        (status = 404, description = "Warehouse not found")
    )
)]
pub async fn get_warehouse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<warehouse::Model>, ServiceError> {
    let found = state.services.warehouses.get_warehouse(id).await?;
    Ok(Json(found))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouses",
    responses((status = 200, description = "Warehouse list"))
)]
pub async fn list_warehouses(
    State(state): State<AppState>,
) -> Result<Json<Vec<warehouse::Model>>, ServiceError> {
    let warehouses = state.services.warehouses.list_warehouses().await?;
    Ok(Json(warehouses))
}
