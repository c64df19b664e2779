use crate::api::AppState;
use crate::db::teams::{Team, TeamInput};
use crate::error::Result;
use crate::security::{AccessScope, UserContext};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
) -> Result<Json<Vec<Team>>> {
    Ok(Json(state.teams.list(&AccessScope::for_user(&user)).await?))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Team>> {
    Ok(Json(state.teams.get(&AccessScope::for_user(&user), id).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Json(input): Json<TeamInput>,
) -> Result<(StatusCode, Json<Team>)> {
    user.require_admin()?;
    let team = state.teams.create(&input).await?;
    info!(team_id = %team.id, name = %team.name, "team created");
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<TeamInput>,
) -> Result<Json<Team>> {
    user.require_admin()?;
    Ok(Json(state.teams.update(id, &input).await?))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    user.require_admin()?;
    state.teams.delete(id).await?;
    info!(team_id = %id, "team deleted");
    Ok(StatusCode::NO_CONTENT)
}
