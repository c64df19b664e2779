use crate::api::AppState;
use crate::db::audit::{AuditFilter, AuditRecord};
use crate::error::Result;
use crate::security::UserContext;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use std::sync::Arc;

/// Recent agent calls. Admin only.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<AuditRecord>>> {
    user.require_admin()?;
    Ok(Json(state.audit.list(&filter).await?))
}
