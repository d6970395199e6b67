use crate::{
    entities::product::{self, PriceTier},
    errors::ServiceError,
    services::products::{NewProduct, ProductUpdate},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PriceTierDto {
    pub id: String,
    pub label: String,
    pub price: Decimal,
}

impl From<PriceTierDto> for PriceTier {
    fn from(dto: PriceTierDto) -> Self {
        PriceTier {
            id: dto.id,
            label: dto.label,
            price: dto.price,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub business_type: Option<String>,
    pub base_price: Decimal,
    #[serde(default)]
    pub delivery_charges: Decimal,
    #[serde(default)]
    pub price_tiers: Vec<PriceTierDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub business_type: Option<String>,
    pub base_price: Option<Decimal>,
    pub delivery_charges: Option<Decimal>,
    pub price_tiers: Option<Vec<PriceTierDto>>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListProductsQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created"),
        (status = 400, description = "Invalid product data")
    )
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(axum::http::StatusCode, Json<product::Model>), ServiceError> {
    request.validate()?;
    let created = state
        .services
        .products
        .create_product(NewProduct {
            name: request.name,
            business_type: request.business_type,
            base_price: request.base_price,
            delivery_charges: request.delivery_charges,
            price_tiers: request.price_tiers.into_iter().map(Into::into).collect(),
        })
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product found"),
        (status = 404, description = "Product not found")
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<product::Model>, ServiceError> {
    let found = state.services.products.get_product(id).await?;
    Ok(Json(found))
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ListProductsQuery),
    responses((status = 200, description = "Product list"))
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ProductListResponse>, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20);
    let (products, total) = state
        .services
        .products
        .list_products(page, per_page, query.search)
        .await?;
    Ok(Json(ProductListResponse {
        products,
        total,
        page,
        per_page: per_page.clamp(1, 100),
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated"),
        (status = 400, description = "Invalid product data"),
        (status = 404, description = "Product not found")
    )
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<product::Model>, ServiceError> {
    let updated = state
        .services
        .products
        .update_product(
            id,
            ProductUpdate {
                name: request.name,
                business_type: request.business_type.map(Some),
                base_price: request.base_price,
                delivery_charges: request.delivery_charges,
                price_tiers: request
                    .price_tiers
                    .map(|tiers| tiers.into_iter().map(Into::into).collect()),
            },
        )
        .await?;
    Ok(Json(updated))
}
