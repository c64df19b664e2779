//! Roles and the authenticated user context.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User role for access control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "employee" => Ok(Role::Employee),
            other => Err(AppError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// The caller, attached to every authenticated request.
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub team_id: Option<Uuid>,
}

impl UserContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_review(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Manager)
    }

    /// Admins manage every team; managers only their own.
    pub fn can_manage_team(&self, team_id: Option<Uuid>) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Manager => team_id.is_some() && team_id == self.team_id,
            Role::Employee => false,
        }
    }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }

    pub fn require_reviewer(&self) -> Result<()> {
        if self.can_review() {
            Ok(())
        } else {
            Err(AppError::Forbidden("manager or admin role required".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role, team_id: Option<Uuid>) -> UserContext {
        UserContext {
            user_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: "A".into(),
            role,
            team_id,
        }
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("finance".parse::<Role>().is_err());
    }

    #[test]
    fn test_can_manage_team() {
        let team = Uuid::new_v4();
        let other = Uuid::new_v4();
        assert!(ctx(Role::Admin, None).can_manage_team(Some(other)));
        assert!(ctx(Role::Manager, Some(team)).can_manage_team(Some(team)));
        assert!(!ctx(Role::Manager, Some(team)).can_manage_team(Some(other)));
        assert!(!ctx(Role::Manager, Some(team)).can_manage_team(None));
        assert!(!ctx(Role::Employee, Some(team)).can_manage_team(Some(team)));
    }
}
