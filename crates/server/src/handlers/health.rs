//! Health check handler.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage_backend: &'static str,
    pub sessions: usize,
}

/// GET /v1/health
///
/// Verifies both dependencies so load balancers stop routing to an instance
/// whose storage or database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.storage.health_check().await?;
    state.metadata.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        storage_backend: state.storage.backend_name(),
        sessions: state.sessions.len().await,
    }))
}
