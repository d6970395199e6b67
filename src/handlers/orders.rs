use crate::{
    entities::{customer, order, order_line},
    errors::ServiceError,
    handlers::inventory::AuditSnapshots,
    services::{
        customers::CustomerDetails,
        orders::{CreateOrder, NewOrderLine, OrderUpdate},
        settlement::LegacyLine,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(update_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/cancel", post(cancel_order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderLineDto {
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub selling_price: Decimal,
    pub cost_price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub discount: Decimal,
}

impl From<OrderLineDto> for NewOrderLine {
    fn from(dto: OrderLineDto) -> Self {
        NewOrderLine {
            product_id: dto.product_id,
            product_name: dto.product_name,
            selling_price: dto.selling_price,
            cost_price: dto.cost_price,
            quantity: dto.quantity,
            discount: dto.discount,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CustomerDto {
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub order_number: Option<String>,
    pub customer: Option<CustomerDto>,
    pub warehouse_id: Option<Uuid>,
    pub price_tier_id: Option<String>,
    #[serde(default)]
    pub products: Vec<OrderLineDto>,
    pub selling_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub quantity: Option<i32>,
    #[serde(default)]
    pub tax_percent: Decimal,
    #[serde(default)]
    pub order_discount: Decimal,
    #[serde(default)]
    pub delivery_charge: Decimal,
    #[serde(default)]
    pub delivery_paid_by_customer: bool,
    pub payment_status: String,
    #[serde(default)]
    pub partial_paid_amount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub products: Option<Vec<OrderLineDto>>,
    pub selling_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub quantity: Option<i32>,
    pub tax_percent: Option<Decimal>,
    pub order_discount: Option<Decimal>,
    pub delivery_charge: Option<Decimal>,
    pub delivery_paid_by_customer: Option<bool>,
    pub payment_status: Option<String>,
    pub partial_paid_amount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[validate(length(min = 1, max = 64))]
    pub status: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListOrdersQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: order::Model,
    pub products: Vec<order_line::Model>,
    pub customer: Option<customer::Model>,
}

/// Creation response: the persisted order plus one before/after ledger
/// snapshot per catalog product the order consumed, in line order.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub audit: Vec<AuditSnapshots>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

fn legacy_of(
    selling_price: Option<Decimal>,
    cost_price: Option<Decimal>,
    quantity: Option<i32>,
) -> Result<Option<LegacyLine>, ServiceError> {
    match (selling_price, cost_price, quantity) {
        (None, None, None) => Ok(None),
        (Some(selling_price), Some(cost_price), Some(quantity)) => Ok(Some(LegacyLine {
            selling_price,
            cost_price,
            quantity,
        })),
        _ => Err(ServiceError::ValidationError(
            "selling_price, cost_price and quantity must be supplied together".to_string(),
        )),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created with computed settlement and ledger snapshots"),
        (status = 400, description = "Invalid order or insufficient stock"),
        (status = 404, description = "Referenced product not found"),
        (status = 409, description = "Order number already exists")
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(axum::http::StatusCode, Json<CreateOrderResponse>), ServiceError> {
    if let Some(customer) = &request.customer {
        customer.validate()?;
    }
    let legacy = legacy_of(request.selling_price, request.cost_price, request.quantity)?;

    // Distinct catalog products this order will deplete, for the audit
    // snapshots bracketing the creation.
    let mut touched: Vec<Uuid> = Vec::new();
    for line in &request.products {
        if let Some(product_id) = line.product_id {
            if !touched.contains(&product_id) {
                touched.push(product_id);
            }
        }
    }

    let ledger = &state.services.ledger;
    let mut before = Vec::with_capacity(touched.len());
    for product_id in &touched {
        before.push(ledger.get_allocations(*product_id).await?);
    }

    let result = state
        .services
        .orders
        .create_order(CreateOrder {
            order_number: request.order_number,
            customer: request.customer.map(|c| CustomerDetails {
                phone: c.phone,
                name: c.name,
                email: c.email,
                address: c.address,
            }),
            warehouse_id: request.warehouse_id,
            price_tier_id: request.price_tier_id,
            lines: request.products.into_iter().map(Into::into).collect(),
            legacy,
            tax_percent: request.tax_percent,
            order_discount: request.order_discount,
            delivery_charge: request.delivery_charge,
            delivery_paid_by_customer: request.delivery_paid_by_customer,
            payment_status: request.payment_status,
            partial_paid_amount: request.partial_paid_amount,
            notes: request.notes,
        })
        .await?;

    let mut audit = Vec::with_capacity(touched.len());
    for (product_id, before) in touched.into_iter().zip(before) {
        let after = ledger.get_allocations(product_id).await?;
        audit.push(AuditSnapshots { before, after });
    }

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreateOrderResponse {
            order: OrderResponse {
                order: result.order,
                products: result.lines,
                customer: result.customer,
            },
            audit,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found"),
        (status = 404, description = "Order not found")
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let result = state.services.orders.get_order(id).await?;
    Ok(Json(OrderResponse {
        order: result.order,
        products: result.lines,
        customer: result.customer,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListOrdersQuery),
    responses((status = 200, description = "Order list"))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20);
    let (orders, total) = state
        .services
        .orders
        .list_orders(page, per_page, query.status)
        .await?;
    Ok(Json(OrderListResponse {
        orders,
        total,
        page,
        per_page: per_page.clamp(1, 100),
    }))
}

/// Edits order content and recomputes financials. Stock consumed at creation
/// is never reconciled here.
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated"),
        (status = 400, description = "Invalid order data"),
        (status = 404, description = "Order not found")
    )
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let legacy = match (request.selling_price, request.cost_price, request.quantity) {
        (None, None, None) => None,
        other => legacy_of(other.0, other.1, other.2)?,
    };

    let result = state
        .services
        .orders
        .update_order(
            id,
            OrderUpdate {
                lines: request
                    .products
                    .map(|lines| lines.into_iter().map(Into::into).collect()),
                legacy,
                tax_percent: request.tax_percent,
                order_discount: request.order_discount,
                delivery_charge: request.delivery_charge,
                delivery_paid_by_customer: request.delivery_paid_by_customer,
                payment_status: request.payment_status,
                partial_paid_amount: request.partial_paid_amount,
                notes: request.notes,
            },
        )
        .await?;

    Ok(Json(OrderResponse {
        order: result.order,
        products: result.lines,
        customer: result.customer,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated"),
        (status = 404, description = "Order not found")
    )
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<order::Model>, ServiceError> {
    request.validate()?;
    let updated = state
        .services
        .orders
        .update_order_status(id, request.status)
        .await?;
    Ok(Json(updated))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already cancelled")
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<order::Model>, ServiceError> {
    let updated = state.services.orders.cancel_order(id).await?;
    Ok(Json(updated))
}
