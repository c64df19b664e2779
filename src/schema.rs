//! Fixed analytics schema exposed to the chat agent.
//!
//! Only tables listed here may be queried through generated SQL. The same
//! definitions drive the LLM schema prompt, the validator's table allowlist
//! and the row-level access filter.

use std::fmt::Write;

/// How rows of a table relate to a user or team for access filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOwnership {
    /// Row belongs to the user referenced by the named column.
    User(&'static str),
    /// Row belongs to the team referenced by the named column.
    Team(&'static str),
    /// The `users` table itself.
    UserTable,
    /// The `teams` table itself.
    TeamTable,
    /// Reference data visible to everyone.
    Shared,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub description: &'static str,
    pub ownership: RowOwnership,
    /// Column used for date-range filtering, if any.
    pub date_column: Option<&'static str>,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

const fn col(name: &'static str, sql_type: &'static str, description: &'static str) -> ColumnDef {
    ColumnDef { name, sql_type, description }
}

pub const TEAMS: TableDef = TableDef {
    name: "teams",
    description: "Organisational teams",
    ownership: RowOwnership::TeamTable,
    date_column: None,
    columns: &[
        col("id", "uuid", "primary key"),
        col("name", "text", "unique team name"),
        col("description", "text", "free-text description"),
        col("created_at", "timestamptz", "creation time"),
    ],
};

pub const USERS: TableDef = TableDef {
    name: "users",
    description: "Employees, managers and admins",
    ownership: RowOwnership::UserTable,
    date_column: None,
    columns: &[
        col("id", "uuid", "primary key"),
        col("email", "text", "unique login email"),
        col("name", "text", "display name"),
        col("role", "text", "'admin' | 'manager' | 'employee'"),
        col("team_id", "uuid", "references teams.id, nullable"),
        col("is_active", "boolean", "false once deactivated"),
        col("created_at", "timestamptz", "creation time"),
    ],
};

pub const DAILY_USAGE: TableDef = TableDef {
    name: "daily_usage",
    description: "One row per user per day with activity totals in seconds",
    ownership: RowOwnership::User("user_id"),
    date_column: Some("date"),
    columns: &[
        col("id", "uuid", "primary key"),
        col("user_id", "uuid", "references users.id"),
        col("date", "date", "calendar day"),
        col("active_seconds", "integer", "seconds with keyboard/mouse activity"),
        col("idle_seconds", "integer", "seconds idle while logged in"),
        col("productive_seconds", "integer", "active seconds in productive apps"),
        col("neutral_seconds", "integer", "active seconds in neutral apps"),
        col("unproductive_seconds", "integer", "active seconds in unproductive apps"),
        col("first_activity_at", "timestamptz", "first activity of the day"),
        col("last_activity_at", "timestamptz", "last activity of the day"),
    ],
};

pub const APP_USAGE: TableDef = TableDef {
    name: "app_usage",
    description: "Per-user, per-day, per-application usage records",
    ownership: RowOwnership::User("user_id"),
    date_column: Some("date"),
    columns: &[
        col("id", "uuid", "primary key"),
        col("user_id", "uuid", "references users.id"),
        col("date", "date", "calendar day"),
        col("app_name", "text", "application name as reported by the agent"),
        col("window_title", "text", "sample window title, nullable"),
        col("duration_seconds", "integer", "foreground seconds"),
        col("session_count", "integer", "number of foreground sessions"),
    ],
};

pub const PROJECTS: TableDef = TableDef {
    name: "projects",
    description: "Projects owned by a team",
    ownership: RowOwnership::Team("team_id"),
    date_column: None,
    columns: &[
        col("id", "uuid", "primary key"),
        col("name", "text", "project name"),
        col("description", "text", "free-text description"),
        col("team_id", "uuid", "owning team, references teams.id"),
        col("status", "text", "'active' | 'archived'"),
        col("created_at", "timestamptz", "creation time"),
    ],
};

pub const PROJECT_TIME_ENTRIES: TableDef = TableDef {
    name: "project_time_entries",
    description: "Time logged by a user against a project",
    ownership: RowOwnership::User("user_id"),
    date_column: Some("date"),
    columns: &[
        col("id", "uuid", "primary key"),
        col("project_id", "uuid", "references projects.id"),
        col("user_id", "uuid", "references users.id"),
        col("date", "date", "day the work happened"),
        col("duration_seconds", "integer", "logged seconds"),
        col("notes", "text", "free-text notes, nullable"),
    ],
};

pub const CLASSIFICATION_RULES: TableDef = TableDef {
    name: "classification_rules",
    description: "Productivity label per application, optionally scoped to a team and role",
    ownership: RowOwnership::Shared,
    date_column: None,
    columns: &[
        col("id", "uuid", "primary key"),
        col("app_name", "text", "lower-cased application name"),
        col("team_id", "uuid", "team scope, null for all teams"),
        col("role", "text", "role scope, null for all roles"),
        col("classification", "text", "'productive' | 'neutral' | 'unproductive'"),
        col("confidence", "double precision", "0..1"),
        col("reasoning", "text", "why the label was chosen"),
        col("source", "text", "'llm' | 'approved' | 'manual'"),
        col("created_at", "timestamptz", "creation time"),
        col("updated_at", "timestamptz", "last change"),
    ],
};

/// Tables the chat agent may read.
pub const ANALYTICS_TABLES: &[TableDef] = &[
    TEAMS,
    USERS,
    DAILY_USAGE,
    APP_USAGE,
    PROJECTS,
    PROJECT_TIME_ENTRIES,
    CLASSIFICATION_RULES,
];

pub fn table(name: &str) -> Option<&'static TableDef> {
    ANALYTICS_TABLES
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(name))
}

pub fn is_known_table(name: &str) -> bool {
    table(name).is_some()
}

/// Schema description embedded in SQL-generation prompts.
pub fn describe_for_prompt() -> String {
    let mut out = String::new();
    for t in ANALYTICS_TABLES {
        let _ = writeln!(out, "TABLE {} -- {}", t.name, t.description);
        for c in t.columns {
            let _ = writeln!(out, "  {} {} -- {}", c.name, c.sql_type, c.description);
        }
        out.push('\n');
    }
    out.push_str(
        "Relationships: users.team_id -> teams.id; daily_usage.user_id, app_usage.user_id, \
         project_time_entries.user_id -> users.id; project_time_entries.project_id -> projects.id; \
         projects.team_id -> teams.id.\n\
         Productivity of an app is found by joining app_usage.app_name = classification_rules.app_name \
         (compare with LOWER(app_usage.app_name)).\n",
    );
    out
}
