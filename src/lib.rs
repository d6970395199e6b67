pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        CustomerService, OrderService, ProductService, StockLedgerService, WarehouseService,
    },
};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer,
};
use utoipa::OpenApi;

#[derive(Clone)]
pub struct Services {
    pub products: ProductService,
    pub warehouses: WarehouseService,
    pub customers: CustomerService,
    pub ledger: StockLedgerService,
    pub orders: OrderService,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub services: Services,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let services = Services {
            products: ProductService::new(db.clone(), event_sender.clone()),
            warehouses: WarehouseService::new(db.clone(), event_sender.clone()),
            customers: CustomerService::new(db.clone()),
            ledger: StockLedgerService::new(db.clone(), event_sender.clone()),
            orders: OrderService::new(db.clone(), event_sender),
        };
        Self {
            db,
            config,
            services,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::products::create_product,
        handlers::products::get_product,
        handlers::products::list_products,
        handlers::products::update_product,
        handlers::warehouses::create_warehouse,
        handlers::warehouses::get_warehouse,
        handlers::warehouses::list_warehouses,
        handlers::inventory::get_allocations,
        handlers::inventory::allocate_stock,
        handlers::inventory::adjust_stock,
        handlers::inventory::transfer_stock,
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::update_order,
        handlers::orders::update_order_status,
        handlers::orders::cancel_order,
    ),
    info(
        title = "StockLot API",
        description = "FIFO cost-lot inventory ledger and order settlement service"
    )
)]
pub struct ApiDoc;

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Builds the full application router with middleware applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_spec))
        .nest("/api/v1", handlers::api_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .with_state(state)
}
