//! Service configuration CRUD, test-send and failure-reset routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::dispatch::DispatchOutcome;
use crate::domain::ServiceConfig;
use crate::service::{NewServiceConfig, ServiceConfigUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{project_id}/service-configs",
            get(list_service_configs).post(create_service_config),
        )
        .route(
            "/service-configs/{id}",
            get(get_service_config)
                .patch(update_service_config)
                .delete(delete_service_config),
        )
        .route("/service-configs/{id}/test", post(test_service_config))
        .route("/service-configs/{id}/clear-failure", post(clear_failure))
}

#[derive(Debug, Default, Deserialize)]
pub struct TestParams {
    /// Shown in the test notification instead of the project id.
    pub project_name: Option<String>,
}

pub async fn list_service_configs(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<ServiceConfig>>> {
    let configs = state.service_configs.list_for_project(&project_id).await?;
    Ok(Json(configs.into_iter().map(ServiceConfig::redacted).collect()))
}

pub async fn create_service_config(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<NewServiceConfig>,
) -> ApiResult<(StatusCode, Json<ServiceConfig>)> {
    let config = state.service_configs.create(&project_id, request).await?;
    Ok((StatusCode::CREATED, Json(config.redacted())))
}

pub async fn get_service_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceConfig>> {
    Ok(Json(state.service_configs.get(&id).await?.redacted()))
}

pub async fn update_service_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ServiceConfigUpdate>,
) -> ApiResult<Json<ServiceConfig>> {
    Ok(Json(state.service_configs.update(&id, update).await?.redacted()))
}

pub async fn delete_service_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service_configs.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a test notification and report the outcome.
///
/// The outcome is also recorded on the configuration, so a failing test marks
/// it as failing.
pub async fn test_service_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TestParams>,
) -> ApiResult<Json<DispatchOutcome>> {
    Ok(Json(
        state.service_configs.send_test(&id, params.project_name).await?,
    ))
}

pub async fn clear_failure(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ServiceConfig>> {
    Ok(Json(state.service_configs.clear_failure(&id).await?.redacted()))
}
