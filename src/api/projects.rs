use crate::api::AppState;
use crate::db::projects::{NewProject, NewTimeEntry, Project, ProjectFilter, ProjectUpdate, TimeEntry};
use crate::error::{AppError, Result};
use crate::security::{AccessScope, UserContext};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct EntryQuery {
    pub limit: Option<u32>,
}

fn require_team_manager(user: &UserContext, team_id: Uuid) -> Result<()> {
    if user.can_manage_team(Some(team_id)) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only admins and the team's manager can change its projects".to_string(),
        ))
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<Project>>> {
    Ok(Json(state.projects.list(&AccessScope::for_user(&user), &filter).await?))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>> {
    Ok(Json(state.projects.get(&AccessScope::for_user(&user), id).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Json(new): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>)> {
    require_team_manager(&user, new.team_id)?;
    let project = state.projects.create(&new).await?;
    info!(project_id = %project.id, team_id = %project.team_id, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<Project>> {
    let current = state.projects.get(&AccessScope::for_user(&user), id).await?;
    require_team_manager(&user, current.team_id)?;
    Ok(Json(state.projects.update(&current, &update).await?))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let current = state.projects.get(&AccessScope::for_user(&user), id).await?;
    require_team_manager(&user, current.team_id)?;
    state.projects.delete(id).await?;
    info!(project_id = %id, "project deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<EntryQuery>,
) -> Result<Json<Vec<TimeEntry>>> {
    let scope = AccessScope::for_user(&user);
    state.projects.get(&scope, id).await?;
    Ok(Json(state.projects.list_entries(&scope, id, query.limit).await?))
}

/// Employees log their own time; admins and managers may log for members
/// of teams they manage.
pub async fn create_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(new): Json<NewTimeEntry>,
) -> Result<(StatusCode, Json<TimeEntry>)> {
    new.check()?;
    let project = state.projects.get(&AccessScope::for_user(&user), id).await?;

    let target = new.user_id.unwrap_or(user.user_id);
    if target != user.user_id {
        let member = state
            .users
            .get(target)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {target} not found")))?;
        if !user.can_manage_team(member.team_id) {
            return Err(AppError::Forbidden(
                "time can only be logged for yourself or members of a team you manage".to_string(),
            ));
        }
    }

    let entry = state.projects.create_entry(project.id, target, &new).await?;
    info!(entry_id = %entry.id, project_id = %project.id, user_id = %target, "time entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}
