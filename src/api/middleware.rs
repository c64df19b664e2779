//! Auth gate for every `/api` route except health.

use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::security::{bearer_token, UserContext};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::debug;

/// Verifies the bearer token, loads the active account and attaches it
/// to the request as a [`UserContext`] extension.
pub async fn require_auth(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Result<Response> {
    let token = bearer_token(req.headers())?;
    let claims = state.verifier.verify(token)?;
    let user: UserContext = state
        .directory
        .find_active(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown or inactive user".to_string()))?;

    debug!(user_id = %user.user_id, role = %user.role, "authenticated");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
