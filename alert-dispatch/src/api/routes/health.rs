//! Liveness and dispatcher status route.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;
use crate::dispatch::DispatchStatsSnapshot;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[derive(Debug, Serialize)]
pub struct DispatcherHealth {
    pub running: bool,
    pub workers: usize,
    pub pending: usize,
    pub stats: DispatchStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub dispatcher: DispatcherHealth,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let running = state.dispatcher.is_running() && !state.dispatch_handle.is_closed();
    Json(HealthResponse {
        status: if running { "ok" } else { "stopping" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        dispatcher: DispatcherHealth {
            running,
            workers: state.dispatcher.config().workers,
            pending: state.dispatch_handle.pending(),
            stats: state.dispatcher.stats().snapshot(),
        },
    })
}
