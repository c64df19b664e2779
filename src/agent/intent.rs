//! Structured description of a natural-language analytics question.

use crate::agent::time::DateRange;
use crate::schema::{self, TableDef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    List,
    Aggregate,
    Trend,
    Comparison,
    Ranking,
}

impl IntentKind {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "list" | "lookup" | "show" => IntentKind::List,
            "trend" | "timeseries" | "time_series" => IntentKind::Trend,
            "comparison" | "compare" => IntentKind::Comparison,
            "ranking" | "rank" | "top" | "top_n" => IntentKind::Ranking,
            _ => IntentKind::Aggregate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Users,
    Teams,
    Projects,
    Apps,
    Usage,
    TimeEntries,
    Classifications,
}

impl EntityKind {
    pub fn table(&self) -> &'static TableDef {
        match self {
            EntityKind::Users => &schema::USERS,
            EntityKind::Teams => &schema::TEAMS,
            EntityKind::Projects => &schema::PROJECTS,
            EntityKind::Apps => &schema::APP_USAGE,
            EntityKind::Usage => &schema::DAILY_USAGE,
            EntityKind::TimeEntries => &schema::PROJECT_TIME_ENTRIES,
            EntityKind::Classifications => &schema::CLASSIFICATION_RULES,
        }
    }

    /// Maps a user-facing noun to an entity.
    pub fn from_word(word: &str) -> Option<Self> {
        let entity = match word.trim().to_lowercase().as_str() {
            "user" | "users" | "employee" | "employees" | "people" | "members"
            | "team members" | "staff" => EntityKind::Users,
            "team" | "teams" => EntityKind::Teams,
            "project" | "projects" => EntityKind::Projects,
            "app" | "apps" | "application" | "applications" | "app_usage" => EntityKind::Apps,
            "usage" | "activity" | "daily_usage" | "productivity" => EntityKind::Usage,
            "time entries" | "time_entries" | "timesheets" | "time entry"
            | "project_time_entries" => EntityKind::TimeEntries,
            "rules" | "classifications" | "classification rules" | "classification_rules" => {
                EntityKind::Classifications
            }
            _ => return None,
        };
        Some(entity)
    }

    pub fn noun(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Teams => "teams",
            EntityKind::Projects => "projects",
            EntityKind::Apps => "apps",
            EntityKind::Usage => "usage records",
            EntityKind::TimeEntries => "time entries",
            EntityKind::Classifications => "classification rules",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "like")]
    Like,
}

impl FilterOp {
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "!=" | "<>" | "ne" | "not" => FilterOp::Ne,
            ">" | "gt" => FilterOp::Gt,
            "<" | "lt" => FilterOp::Lt,
            ">=" | "gte" => FilterOp::Gte,
            "<=" | "lte" => FilterOp::Lte,
            "like" | "ilike" | "contains" => FilterOp::Like,
            _ => FilterOp::Eq,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::Like => "ILIKE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

impl Filter {
    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A team resolved from a free-text mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub intent: IntentKind,
    pub entity: EntityKind,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub date_range: Option<DateRange>,
    pub limit: Option<u32>,
    /// Team the question is restricted to, after fuzzy matching.
    pub team: Option<TeamRef>,
    /// Team name that could not be matched to a known team.
    pub unmatched_team: Option<String>,
    /// Whether the structure came from the keyword fast path.
    pub fast_path: bool,
}

impl QueryIntent {
    pub fn list(entity: EntityKind) -> Self {
        Self {
            intent: IntentKind::List,
            entity,
            metrics: Vec::new(),
            filters: Vec::new(),
            date_range: None,
            limit: None,
            team: None,
            unmatched_team: None,
            fast_path: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_parsing_defaults() {
        assert_eq!(IntentKind::parse_lenient("TREND"), IntentKind::Trend);
        assert_eq!(IntentKind::parse_lenient("summarise"), IntentKind::Aggregate);
        assert_eq!(FilterOp::parse_lenient("<>"), FilterOp::Ne);
        assert_eq!(FilterOp::parse_lenient("??"), FilterOp::Eq);
    }

    #[test]
    fn test_entity_words() {
        assert_eq!(EntityKind::from_word("Employees"), Some(EntityKind::Users));
        assert_eq!(EntityKind::from_word("applications"), Some(EntityKind::Apps));
        assert_eq!(EntityKind::from_word("time entries"), Some(EntityKind::TimeEntries));
        assert_eq!(EntityKind::from_word("invoices"), None);
        assert_eq!(EntityKind::Usage.table().name, "daily_usage");
    }

    #[test]
    fn test_filter_op_serde() {
        let f: Filter = serde_json::from_str(r#"{"field":"role","op":">=","value":3}"#).unwrap();
        assert_eq!(f.op, FilterOp::Gte);
        assert_eq!(f.value_text().as_deref(), Some("3"));
    }
}
