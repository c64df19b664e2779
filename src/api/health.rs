use crate::api::AppState;
use crate::db::ping;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub llm_configured: bool,
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = ping(&state.pool).await;
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        llm_configured: state.llm_configured,
        version: env!("CARGO_PKG_VERSION"),
    })
}
