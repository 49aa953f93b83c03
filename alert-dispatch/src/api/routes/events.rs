//! Issue event intake route.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::domain::IssueEvent;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_event))
}

#[derive(Debug, Serialize)]
pub struct SubmitEventResponse {
    pub status: &'static str,
    pub project_id: String,
    pub issue_id: String,
}

/// Enqueue an issue event. Delivery happens in the background.
pub async fn submit_event(
    State(state): State<AppState>,
    Json(event): Json<IssueEvent>,
) -> ApiResult<(StatusCode, Json<SubmitEventResponse>)> {
    let response = SubmitEventResponse {
        status: "queued",
        project_id: event.project_id.clone(),
        issue_id: event.issue_id.clone(),
    };
    state.dispatch_handle.submit(event)?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}
