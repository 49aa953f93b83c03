//! Backend catalogue route.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::server::AppState;
use crate::backends::BackendInfo;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_backends))
}

/// Registered backend kinds with their display names.
pub async fn list_backends(State(state): State<AppState>) -> Json<Vec<BackendInfo>> {
    Json(state.service_configs.backends())
}
