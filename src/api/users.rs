use crate::api::AppState;
use crate::db::users::{NewUser, User, UserFilter, UserUpdate};
use crate::error::Result;
use crate::security::{AccessScope, UserContext};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub async fn me(Extension(user): Extension<UserContext>) -> Json<UserContext> {
    Json(user)
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>> {
    let users = state.users.list(&AccessScope::for_user(&user), &filter).await?;
    Ok(Json(users))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    Ok(Json(state.users.get_visible(&AccessScope::for_user(&user), id).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Json(new): Json<NewUser>,
) -> Result<(StatusCode, Json<User>)> {
    user.require_admin()?;
    let created = state.users.create(&new).await?;
    info!(by = %user.user_id, user_id = %created.id, role = %created.role, "user created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>> {
    user.require_admin()?;
    Ok(Json(state.users.update(id, &update).await?))
}

pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>> {
    user.require_admin()?;
    let deactivated = state.users.deactivate(id).await?;
    info!(by = %user.user_id, user_id = %id, "user deactivated");
    Ok(Json(deactivated))
}
