//! Row-level access filter.
//!
//! Maps a caller's role to the rows they may see and renders that scope as
//! a SQL predicate with bound parameters.

use crate::execution::SqlParam;
use crate::schema::{RowOwnership, TableDef};
use crate::security::policy::{Role, UserContext};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    All,
    Team(Uuid),
    User(Uuid),
}

/// A predicate fragment plus the parameters it references.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPredicate {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl AccessScope {
    pub fn for_user(user: &UserContext) -> Self {
        match user.role {
            Role::Admin => AccessScope::All,
            Role::Manager => match user.team_id {
                Some(team_id) => AccessScope::Team(team_id),
                None => AccessScope::User(user.user_id),
            },
            Role::Employee => AccessScope::User(user.user_id),
        }
    }

    /// Predicate restricting `table` (referenced as `alias`) to this scope.
    /// Placeholders start at `$first_placeholder`. `None` means unrestricted.
    pub fn predicate(
        &self,
        table: &TableDef,
        alias: &str,
        first_placeholder: usize,
    ) -> Option<AccessPredicate> {
        let n = first_placeholder;
        let (sql, id) = match (*self, table.ownership) {
            (AccessScope::All, _) | (_, RowOwnership::Shared) => return None,

            (AccessScope::Team(team), RowOwnership::User(column)) => (
                format!("{alias}.{column} IN (SELECT id FROM users WHERE team_id = ${n})"),
                team,
            ),
            (AccessScope::User(user), RowOwnership::User(column)) => {
                (format!("{alias}.{column} = ${n}"), user)
            }

            (AccessScope::Team(team), RowOwnership::UserTable) => {
                (format!("{alias}.team_id = ${n}"), team)
            }
            (AccessScope::User(user), RowOwnership::UserTable) => {
                (format!("{alias}.id = ${n}"), user)
            }

            (AccessScope::Team(team), RowOwnership::TeamTable) => {
                (format!("{alias}.id = ${n}"), team)
            }
            (AccessScope::User(user), RowOwnership::TeamTable) => (
                format!("{alias}.id = (SELECT team_id FROM users WHERE id = ${n})"),
                user,
            ),

            (AccessScope::Team(team), RowOwnership::Team(column)) => {
                (format!("{alias}.{column} = ${n}"), team)
            }
            (AccessScope::User(user), RowOwnership::Team(column)) => (
                format!("{alias}.{column} = (SELECT team_id FROM users WHERE id = ${n})"),
                user,
            ),
        };

        Some(AccessPredicate {
            sql,
            params: vec![SqlParam::Uuid(id)],
        })
    }

    /// Whether a row owned by `owner_user` in `owner_team` is visible.
    pub fn allows(&self, owner_user: Option<Uuid>, owner_team: Option<Uuid>) -> bool {
        match self {
            AccessScope::All => true,
            AccessScope::Team(team) => owner_team == Some(*team),
            AccessScope::User(user) => owner_user == Some(*user),
        }
    }
}
