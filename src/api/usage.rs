use crate::api::AppState;
use crate::db::usage::{AppUsage, DailyUsage, UsageQuery, UsageSummary};
use crate::error::Result;
use crate::security::{AccessScope, UserContext};
use axum::extract::{Query, State};
use axum::{Extension, Json};
use std::sync::Arc;

pub async fn daily(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<DailyUsage>>> {
    Ok(Json(state.usage.daily(&AccessScope::for_user(&user), &query).await?))
}

pub async fn apps(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<AppUsage>>> {
    Ok(Json(state.usage.apps(&AccessScope::for_user(&user), &query).await?))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageSummary>> {
    Ok(Json(state.usage.summary(&AccessScope::for_user(&user), &query).await?))
}
