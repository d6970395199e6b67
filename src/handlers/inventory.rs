use crate::{
    errors::ServiceError,
    services::ledger::{
        AdjustOutcome, AllocateOutcome, ProductAllocationsView, TransferOutcome,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:product_id", get(get_allocations))
        .route("/allocate", post(allocate_stock))
        .route("/adjust", post(adjust_stock))
        .route("/transfer", post(transfer_stock))
}

/// Ledger snapshots taken around a mutation, for the external audit
/// collaborator to diff.
#[derive(Debug, Serialize)]
pub struct AuditSnapshots {
    pub before: ProductAllocationsView,
    pub after: ProductAllocationsView,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AllocateStockRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub cost_price: Decimal,
    pub price_tier_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AllocateStockResponse {
    #[serde(flatten)]
    pub outcome: AllocateOutcome,
    pub audit: AuditSnapshots,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(range(min = 0))]
    pub target_quantity: i32,
    pub price_tier_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustStockResponse {
    #[serde(flatten)]
    pub outcome: AdjustOutcome,
    pub audit: AuditSnapshots,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferStockRequest {
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub price_tier_id: Option<String>,
    pub note: Option<String>,
    pub performed_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransferStockResponse {
    #[serde(flatten)]
    pub outcome: TransferOutcome,
    pub audit: AuditSnapshots,
}

/// Aggregated per-warehouse allocation view for one product.
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Allocation view"),
        (status = 404, description = "Product not found")
    )
)]
pub async fn get_allocations(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ProductAllocationsView>, ServiceError> {
    let view = state.services.ledger.get_allocations(product_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/allocate",
    request_body = AllocateStockRequest,
    responses(
        (status = 200, description = "Batch appended"),
        (status = 400, description = "Invalid quantity or cost price"),
        (status = 404, description = "Product or warehouse not found")
    )
)]
pub async fn allocate_stock(
    State(state): State<AppState>,
    Json(request): Json<AllocateStockRequest>,
) -> Result<Json<AllocateStockResponse>, ServiceError> {
    request.validate()?;
    let ledger = &state.services.ledger;

    let before = ledger.get_allocations(request.product_id).await?;
    let outcome = ledger
        .allocate(
            request.product_id,
            request.warehouse_id,
            request.quantity,
            request.cost_price,
            request.price_tier_id,
        )
        .await?;
    let after = ledger.get_allocations(request.product_id).await?;

    Ok(Json(AllocateStockResponse {
        outcome,
        audit: AuditSnapshots { before, after },
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/adjust",
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted"),
        (status = 404, description = "No matching allocation"),
        (status = 409, description = "Target exceeds current stock")
    )
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Json<AdjustStockResponse>, ServiceError> {
    request.validate()?;
    let ledger = &state.services.ledger;

    let before = ledger.get_allocations(request.product_id).await?;
    let outcome = ledger
        .adjust(
            request.product_id,
            request.warehouse_id,
            request.target_quantity,
            request.price_tier_id,
        )
        .await?;
    let after = ledger.get_allocations(request.product_id).await?;

    Ok(Json(AdjustStockResponse {
        outcome,
        audit: AuditSnapshots { before, after },
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfer",
    request_body = TransferStockRequest,
    responses(
        (status = 200, description = "Stock moved between warehouses"),
        (status = 400, description = "Source equals destination or invalid quantity"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Insufficient source stock")
    )
)]
pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(request): Json<TransferStockRequest>,
) -> Result<Json<TransferStockResponse>, ServiceError> {
    request.validate()?;
    let ledger = &state.services.ledger;

    let before = ledger.get_allocations(request.product_id).await?;
    let outcome = ledger
        .transfer(
            request.product_id,
            request.from_warehouse_id,
            request.to_warehouse_id,
            request.quantity,
            request.price_tier_id,
            request.note,
            request.performed_by,
        )
        .await?;
    let after = ledger.get_allocations(request.product_id).await?;

    Ok(Json(TransferStockResponse {
        outcome,
        audit: AuditSnapshots { before, after },
    }))
}
