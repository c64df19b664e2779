//! Projects and the time logged against them.

use crate::db::{constraint_error, page_limit};
use crate::error::{AppError, Result};
use crate::execution::{bind_all, SelectBuilder};
use crate::schema;
use crate::security::AccessScope;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const PROJECT_COLUMNS: &str = "p.id, p.name, p.description, p.team_id, p.status, p.created_at";
const ENTRY_COLUMNS: &str = "te.id, te.project_id, te.user_id, te.date, te.duration_seconds, te.notes";

/// Longest single time entry: one full day.
pub const MAX_ENTRY_SECONDS: i32 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(AppError::Validation(format!("Unknown project status '{other}'"))),
        }
    }
}

impl TryFrom<String> for ProjectStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub team_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilter {
    pub team_id: Option<Uuid>,
    pub status: Option<ProjectStatus>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub team_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TimeEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub duration_seconds: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTimeEntry {
    /// Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub date: NaiveDate,
    pub duration_seconds: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewTimeEntry {
    pub fn check(&self) -> Result<()> {
        if !(1..=MAX_ENTRY_SECONDS).contains(&self.duration_seconds) {
            return Err(AppError::Validation(format!(
                "duration_seconds must be between 1 and {MAX_ENTRY_SECONDS}"
            )));
        }
        Ok(())
    }
}

fn check_project_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("project name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct ProjectRepository {
    pool: PgPool,
}

impl ProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, scope: &AccessScope, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut query = SelectBuilder::new(format!("SELECT {PROJECT_COLUMNS} FROM projects p"));
        if let Some(team_id) = filter.team_id {
            query.filter("p.team_id", "=", team_id);
        }
        if let Some(status) = filter.status {
            query.filter("p.status", "=", status.as_str());
        }
        query
            .restrict(scope, &schema::PROJECTS, "p")
            .order_by("p.name")
            .limit(page_limit(filter.limit, 100, 1000));
        let (sql, params) = query.build();
        let projects = bind_all(sqlx::query_as::<_, Project>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(projects)
    }

    pub async fn get(&self, scope: &AccessScope, id: Uuid) -> Result<Project> {
        let mut query = SelectBuilder::new(format!("SELECT {PROJECT_COLUMNS} FROM projects p"));
        query.filter("p.id", "=", id).restrict(scope, &schema::PROJECTS, "p");
        let (sql, params) = query.build();
        bind_all(sqlx::query_as::<_, Project>(&sql), &params)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {id} not found")))
    }

    pub async fn create(&self, new: &NewProject) -> Result<Project> {
        let name = check_project_name(&new.name)?;
        let project = sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects AS p (id, name, description, team_id, status, created_at) \
             VALUES ($1, $2, $3, $4, 'active', NOW()) RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(&new.description)
        .bind(new.team_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "project"))?;
        Ok(project)
    }

    pub async fn update(&self, current: &Project, update: &ProjectUpdate) -> Result<Project> {
        let name = match &update.name {
            Some(name) => check_project_name(name)?,
            None => current.name.clone(),
        };
        let description = update.description.clone().or_else(|| current.description.clone());
        let status = update.status.unwrap_or(current.status);

        let project = sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects AS p SET name = $2, description = $3, status = $4 \
             WHERE p.id = $1 RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(current.id)
        .bind(&name)
        .bind(&description)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "project"))?;
        project.ok_or_else(|| AppError::NotFound(format!("Project {} not found", current.id)))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "project"))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Project {id} not found")));
        }
        Ok(())
    }

    /// Entries for a project, newest first, limited to what `scope` may see.
    pub async fn list_entries(&self, scope: &AccessScope, project_id: Uuid, limit: Option<u32>) -> Result<Vec<TimeEntry>> {
        let mut query = SelectBuilder::new(format!("SELECT {ENTRY_COLUMNS} FROM project_time_entries te"));
        query
            .filter("te.project_id", "=", project_id)
            .restrict(scope, &schema::PROJECT_TIME_ENTRIES, "te")
            .order_by("te.date DESC, te.id")
            .limit(page_limit(limit, 200, 2000));
        let (sql, params) = query.build();
        let entries = bind_all(sqlx::query_as::<_, TimeEntry>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn create_entry(&self, project_id: Uuid, user_id: Uuid, new: &NewTimeEntry) -> Result<TimeEntry> {
        new.check()?;
        let notes = new
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let entry = sqlx::query_as::<_, TimeEntry>(&format!(
            "INSERT INTO project_time_entries AS te (id, project_id, user_id, date, duration_seconds, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(user_id)
        .bind(new.date)
        .bind(new.duration_seconds)
        .bind(&notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "time entry"))?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("Archived".parse::<ProjectStatus>().unwrap(), ProjectStatus::Archived);
        assert!("done".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_entry_duration_bounds() {
        let entry = |secs| NewTimeEntry {
            user_id: None,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            duration_seconds: secs,
            notes: None,
        };
        assert!(entry(0).check().is_err());
        assert!(entry(3600).check().is_ok());
        assert!(entry(MAX_ENTRY_SECONDS + 1).check().is_err());
    }
}
