//! API route modules.

pub mod backends;
pub mod events;
pub mod health;
pub mod service_configs;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/health", health::router())
        .nest("/api/backends", backends::router())
        .nest("/api/events", events::router())
        .nest("/api", service_configs::router())
        .with_state(state)
}
