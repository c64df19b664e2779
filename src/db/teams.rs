//! Teams.

use crate::agent::{TeamDirectory, TeamRef};
use crate::db::constraint_error;
use crate::error::{AppError, Result};
use crate::execution::{bind_all, SelectBuilder};
use crate::schema;
use crate::security::AccessScope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub member_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl TeamInput {
    fn checked(&self) -> Result<(String, Option<String>)> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("team name must not be empty".to_string()));
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        Ok((name.to_string(), description))
    }
}

const TEAM_SELECT: &str = "SELECT t.id, t.name, t.description, t.created_at, \
     (SELECT COUNT(*) FROM users m WHERE m.team_id = t.id AND m.is_active) AS member_count \
     FROM teams t";

#[derive(Clone)]
pub struct TeamRepository {
    pool: PgPool,
}

impl TeamRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, scope: &AccessScope) -> Result<Vec<Team>> {
        let mut query = SelectBuilder::new(TEAM_SELECT);
        query.restrict(scope, &schema::TEAMS, "t").order_by("t.name");
        let (sql, params) = query.build();
        let teams = bind_all(sqlx::query_as::<_, Team>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(teams)
    }

    pub async fn get(&self, scope: &AccessScope, id: Uuid) -> Result<Team> {
        let mut query = SelectBuilder::new(TEAM_SELECT);
        query.filter("t.id", "=", id).restrict(scope, &schema::TEAMS, "t");
        let (sql, params) = query.build();
        bind_all(sqlx::query_as::<_, Team>(&sql), &params)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Team {id} not found")))
    }

    pub async fn create(&self, input: &TeamInput) -> Result<Team> {
        let (name, description) = input.checked()?;
        let team = sqlx::query_as::<_, Team>(
            "INSERT INTO teams (id, name, description, created_at) VALUES ($1, $2, $3, NOW()) \
             RETURNING id, name, description, created_at, 0::bigint AS member_count",
        )
        .bind(Uuid::new_v4())
        .bind(&name)
        .bind(&description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "team"))?;
        Ok(team)
    }

    pub async fn update(&self, id: Uuid, input: &TeamInput) -> Result<Team> {
        let (name, description) = input.checked()?;
        let updated = sqlx::query("UPDATE teams SET name = $2, description = $3 WHERE id = $1")
            .bind(id)
            .bind(&name)
            .bind(&description)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "team"))?;
        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team {id} not found")));
        }
        self.get(&AccessScope::All, id).await
    }

    /// Fails with `Conflict` while users or projects still reference the team.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, "team"))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Team {id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl TeamDirectory for TeamRepository {
    async fn teams(&self) -> Result<Vec<TeamRef>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as("SELECT id, name FROM teams ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| TeamRef { id, name }).collect())
    }
}
