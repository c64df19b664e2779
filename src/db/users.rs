//! User accounts.

use crate::db::{constraint_error, page_limit};
use crate::error::{AppError, Result};
use crate::execution::{bind_all, SelectBuilder};
use crate::schema;
use crate::security::{AccessScope, Role, UserContext, UserDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const USER_COLUMNS: &str = "u.id, u.email, u.name, u.role, u.team_id, u.is_active, u.created_at";

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub team_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn context(&self) -> UserContext {
        UserContext {
            user_id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
            team_id: self.team_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub team_id: Option<Uuid>,
    pub role: Option<Role>,
    #[serde(default)]
    pub include_inactive: bool,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub team_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub team_id: Option<Uuid>,
    /// Removes the team assignment; wins over `team_id`.
    #[serde(default)]
    pub clear_team: bool,
    pub is_active: Option<bool>,
}

fn check_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation(format!("'{email}' is not a valid email address"))),
    }
}

fn check_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, scope: &AccessScope, filter: &UserFilter) -> Result<Vec<User>> {
        let mut query = SelectBuilder::new(format!("SELECT {USER_COLUMNS} FROM users u"));
        if let Some(team_id) = filter.team_id {
            query.filter("u.team_id", "=", team_id);
        }
        if let Some(role) = filter.role {
            query.filter("u.role", "=", role.as_str());
        }
        if !filter.include_inactive {
            query.condition("u.is_active");
        }
        query
            .restrict(scope, &schema::USERS, "u")
            .order_by("u.name")
            .limit(page_limit(filter.limit, 100, 1000));

        let (sql, params) = query.build();
        let users = bind_all(sqlx::query_as::<_, User>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// The user if it exists and lies inside `scope`.
    pub async fn get_visible(&self, scope: &AccessScope, id: Uuid) -> Result<User> {
        self.get(id)
            .await?
            .filter(|u| scope.allows(Some(u.id), u.team_id))
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }

    pub async fn create(&self, new: &NewUser) -> Result<User> {
        let email = check_email(&new.email)?;
        let name = check_name(&new.name)?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users AS u (id, email, name, role, team_id, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, TRUE, NOW()) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(&name)
        .bind(new.role.as_str())
        .bind(new.team_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "user"))?;
        Ok(user)
    }

    pub async fn update(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let current = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;

        let email = match &update.email {
            Some(email) => check_email(email)?,
            None => current.email,
        };
        let name = match &update.name {
            Some(name) => check_name(name)?,
            None => current.name,
        };
        let team_id = if update.clear_team {
            None
        } else {
            update.team_id.or(current.team_id)
        };

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users AS u SET email = $2, name = $3, role = $4, team_id = $5, is_active = $6 \
             WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&email)
        .bind(&name)
        .bind(update.role.unwrap_or(current.role).as_str())
        .bind(team_id)
        .bind(update.is_active.unwrap_or(current.is_active))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "user"))?;
        Ok(user)
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users AS u SET is_active = FALSE WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_active(&self, id: Uuid) -> Result<Option<UserContext>> {
        Ok(self.get(id).await?.filter(|u| u.is_active).map(|u| u.context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_and_name_checks() {
        assert_eq!(check_email(" Ana@Example.com ").unwrap(), "ana@example.com");
        assert!(check_email("ana").is_err());
        assert!(check_email("@example.com").is_err());
        assert!(check_email("ana@localhost").is_err());
        assert!(check_name("   ").is_err());
        assert_eq!(check_name(" Ana ").unwrap(), "Ana");
    }
}
