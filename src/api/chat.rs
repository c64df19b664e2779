use crate::agent::ChatResponse;
use crate::api::AppState;
use crate::error::Result;
use crate::security::UserContext;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Natural-language question in, answer plus the SQL and rows behind it out.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let response = state.chat.ask(&user, &request.message).await?;
    Ok(Json(response))
}
