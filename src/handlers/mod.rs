pub mod health;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod warehouses;

use crate::AppState;
use axum::Router;

/// Assembles the versioned API surface.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/products", products::router())
        .nest("/warehouses", warehouses::router())
        .nest("/inventory", inventory::router())
        .nest("/orders", orders::router())
}
