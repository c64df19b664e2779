//! Turns a `QueryIntent` into parameterized, access-scoped SQL.
//!
//! List intents use fixed templates. Everything else is written by the LLM
//! and then cleaned, repaired and scoped to the caller's rows before it
//! reaches the validator.

use crate::agent::intent::{EntityKind, Filter, FilterOp, IntentKind, QueryIntent};
use crate::agent::prompts::{sql_prompt, SQL_SYSTEM_PROMPT};
use crate::agent::sql_repair::{
    clean_llm_sql, ensure_limit, primary_from, repair_conjunctions, repair_division, repair_round,
    splice_where,
};
use crate::agent::sql_validator::cte_names;
use crate::error::{AppError, Result};
use crate::execution::{SelectBuilder, SqlParam};
use crate::llm::{CompletionProvider, CompletionRequest};
use crate::schema::{self, RowOwnership, TableDef};
use crate::security::AccessScope;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\d+").unwrap();
    static ref WITH_PREFIX: Regex = Regex::new(r"(?i)^\s*WITH\s+(RECURSIVE\s+)?").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"[a-z_][a-z0-9_]*").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlSource {
    Template,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedSql {
    pub sql: String,
    #[serde(skip)]
    pub params: Vec<SqlParam>,
    pub source: SqlSource,
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Bool,
    Number,
}

/// A filterable column: accepted field names, SQL expression, value kind.
type FieldSpec = (&'static [&'static str], &'static str, FieldKind);

struct ListTemplate {
    table: &'static TableDef,
    alias: &'static str,
    base: &'static str,
    /// Expression holding the owning team id.
    team_column: &'static str,
    fields: &'static [FieldSpec],
    group_by: Option<&'static str>,
    order_by: &'static str,
}

fn list_template(entity: EntityKind) -> ListTemplate {
    match entity {
        EntityKind::Users => ListTemplate {
            table: &schema::USERS,
            alias: "u",
            base: "SELECT u.id, u.name, u.email, u.role, t.name AS team_name, u.is_active \
                   FROM users u LEFT JOIN teams t ON t.id = u.team_id",
            team_column: "u.team_id",
            fields: &[
                (&["name", "user", "user_name"], "u.name", FieldKind::Text),
                (&["email"], "u.email", FieldKind::Text),
                (&["role"], "u.role", FieldKind::Text),
                (&["is_active", "active"], "u.is_active", FieldKind::Bool),
            ],
            group_by: None,
            order_by: "u.name",
        },
        EntityKind::Teams => ListTemplate {
            table: &schema::TEAMS,
            alias: "t",
            base: "SELECT t.id, t.name, t.description, COUNT(u.id) AS member_count \
                   FROM teams t LEFT JOIN users u ON u.team_id = t.id AND u.is_active",
            team_column: "t.id",
            fields: &[
                (&["name", "team_name"], "t.name", FieldKind::Text),
                (&["description"], "t.description", FieldKind::Text),
            ],
            group_by: Some("t.id, t.name, t.description"),
            order_by: "t.name",
        },
        EntityKind::Projects => ListTemplate {
            table: &schema::PROJECTS,
            alias: "p",
            base: "SELECT p.id, p.name, p.status, t.name AS team_name, p.created_at \
                   FROM projects p LEFT JOIN teams t ON t.id = p.team_id",
            team_column: "p.team_id",
            fields: &[
                (&["name", "project", "project_name"], "p.name", FieldKind::Text),
                (&["status"], "p.status", FieldKind::Text),
            ],
            group_by: None,
            order_by: "p.name",
        },
        EntityKind::Apps => ListTemplate {
            table: &schema::APP_USAGE,
            alias: "au",
            base: "SELECT au.app_name, SUM(au.duration_seconds) AS total_seconds, \
                   COUNT(DISTINCT au.user_id) AS user_count \
                   FROM app_usage au JOIN users u ON u.id = au.user_id",
            team_column: "u.team_id",
            fields: &[
                (&["app", "app_name", "application"], "au.app_name", FieldKind::Text),
                (&["user", "user_name"], "u.name", FieldKind::Text),
            ],
            group_by: Some("au.app_name"),
            order_by: "total_seconds DESC, au.app_name",
        },
        EntityKind::Usage => ListTemplate {
            table: &schema::DAILY_USAGE,
            alias: "du",
            base: "SELECT du.date, u.name AS user_name, du.active_seconds, du.idle_seconds, \
                   du.productive_seconds, du.unproductive_seconds \
                   FROM daily_usage du JOIN users u ON u.id = du.user_id",
            team_column: "u.team_id",
            fields: &[
                (&["user", "user_name", "name"], "u.name", FieldKind::Text),
                (&["active_seconds"], "du.active_seconds", FieldKind::Number),
                (&["productive_seconds"], "du.productive_seconds", FieldKind::Number),
            ],
            group_by: None,
            order_by: "du.date DESC, u.name",
        },
        EntityKind::TimeEntries => ListTemplate {
            table: &schema::PROJECT_TIME_ENTRIES,
            alias: "te",
            base: "SELECT te.date, u.name AS user_name, p.name AS project_name, \
                   te.duration_seconds, te.notes \
                   FROM project_time_entries te JOIN users u ON u.id = te.user_id \
                   JOIN projects p ON p.id = te.project_id",
            team_column: "u.team_id",
            fields: &[
                (&["user", "user_name"], "u.name", FieldKind::Text),
                (&["project", "project_name"], "p.name", FieldKind::Text),
            ],
            group_by: None,
            order_by: "te.date DESC, u.name",
        },
        EntityKind::Classifications => ListTemplate {
            table: &schema::CLASSIFICATION_RULES,
            alias: "r",
            base: "SELECT r.app_name, r.classification, r.confidence, t.name AS team_name, \
                   r.role, r.source, r.updated_at \
                   FROM classification_rules r LEFT JOIN teams t ON t.id = r.team_id",
            team_column: "r.team_id",
            fields: &[
                (&["app", "app_name", "application"], "r.app_name", FieldKind::Text),
                (&["classification", "label"], "r.classification", FieldKind::Text),
                (&["source"], "r.source", FieldKind::Text),
                (&["role"], "r.role", FieldKind::Text),
                (&["confidence"], "r.confidence", FieldKind::Number),
            ],
            group_by: None,
            order_by: "r.app_name",
        },
    }
}

fn filter_param(filter: &Filter, kind: FieldKind) -> Option<SqlParam> {
    match (kind, &filter.value) {
        (FieldKind::Bool, Value::Bool(b)) => Some(SqlParam::Bool(*b)),
        (FieldKind::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(SqlParam::Bool(true)),
            "false" | "no" | "0" => Some(SqlParam::Bool(false)),
            _ => None,
        },
        (FieldKind::Number, Value::Number(n)) => n.as_f64().map(SqlParam::Float),
        (FieldKind::Number, Value::String(s)) => s.trim().parse().ok().map(SqlParam::Float),
        (FieldKind::Text, _) => {
            let text = filter.value_text()?;
            if filter.op == FilterOp::Like && !text.contains('%') {
                Some(SqlParam::Text(format!("%{text}%")))
            } else {
                Some(SqlParam::Text(text))
            }
        }
        _ => None,
    }
}

/// Templated SQL for a list intent.
pub fn template_sql(intent: &QueryIntent, scope: &AccessScope, max_rows: usize) -> GeneratedSql {
    let template = list_template(intent.entity);
    let mut query = SelectBuilder::new(template.base);

    for filter in &intent.filters {
        let field = filter.field.as_str();
        let Some((_, expr, kind)) = template.fields.iter().find(|(names, _, _)| names.contains(&field)) else {
            debug!(field, entity = ?intent.entity, "ignoring filter on unknown field");
            continue;
        };
        let op = match kind {
            FieldKind::Bool => "=",
            _ => filter.op.as_sql(),
        };
        match filter_param(filter, *kind) {
            Some(param) => {
                query.filter(expr, op, param);
            }
            None => debug!(field, "ignoring filter with unusable value"),
        }
    }

    if let Some(team) = &intent.team {
        query.filter(template.team_column, "=", team.id);
    } else if let Some(name) = &intent.unmatched_team {
        let placeholder = query.bind(name.as_str());
        query.condition(format!(
            "{} IN (SELECT id FROM teams WHERE name = {placeholder})",
            template.team_column
        ));
    }

    if let (Some(range), Some(column)) = (&intent.date_range, template.table.date_column) {
        let expr = format!("{}.{}", template.alias, column);
        query.filter(&expr, ">=", range.start).filter(&expr, "<=", range.end);
    }

    query.restrict(scope, template.table, template.alias);

    if let Some(group_by) = template.group_by {
        query.group_by(group_by);
    }
    let limit = intent
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
        .min(max_rows.max(1) as u32);
    query.order_by(template.order_by).limit(limit);

    let (sql, params) = query.build();
    GeneratedSql {
        sql,
        params,
        source: SqlSource::Template,
    }
}

/// Cleans and scopes LLM output. Every access predicate references `$1`.
pub fn finalize_llm_sql(raw: &str, scope: &AccessScope, max_rows: usize) -> Result<GeneratedSql> {
    let cleaned = clean_llm_sql(raw);
    if cleaned.is_empty() {
        return Err(AppError::Llm("LLM returned no SQL".to_string()));
    }
    if PLACEHOLDER.is_match(&cleaned) {
        return Err(AppError::UnsafeSql(
            "generated SQL must not contain bind placeholders".to_string(),
        ));
    }

    let repaired = repair_round(&repair_division(&repair_conjunctions(&cleaned)));
    let mut sql = ensure_limit(&repaired, max_rows);
    let mut params = Vec::new();

    if *scope != AccessScope::All {
        let own_ctes = cte_names(&sql);
        if let Some(clash) = own_ctes.iter().find(|name| schema::is_known_table(name)) {
            return Err(AppError::UnsafeSql(format!(
                "CTE name shadows a schema table: {clash}"
            )));
        }

        if let Some((table, alias)) = primary_from(&sql) {
            if let Some(def) = schema::table(&table) {
                if let Some(predicate) = scope.predicate(def, &alias, 1) {
                    sql = splice_where(&sql, &predicate.sql);
                }
            }
        }

        sql = shadow_scoped_tables(&sql, scope);
        // Queries over shared tables only carry no predicate.
        if let (AccessScope::Team(id) | AccessScope::User(id), true) = (scope, PLACEHOLDER.is_match(&sql)) {
            params.push(SqlParam::Uuid(*id));
        }
    }

    Ok(GeneratedSql {
        sql,
        params,
        source: SqlSource::Llm,
    })
}

/// Prepends CTEs that replace every referenced schema table with its
/// access-filtered rows, so joins and subqueries only see permitted data.
/// `users` is defined last because the other filters read the base table.
fn shadow_scoped_tables(sql: &str, scope: &AccessScope) -> String {
    let lower = sql.to_lowercase();
    let words: HashSet<&str> = IDENTIFIER.find_iter(&lower).map(|m| m.as_str()).collect();
    let mut defs: Vec<&TableDef> = schema::ANALYTICS_TABLES
        .iter()
        .filter(|t| t.ownership != RowOwnership::Shared)
        .filter(|t| words.contains(t.name))
        .collect();
    defs.sort_by_key(|t| t.ownership == RowOwnership::UserTable);

    let ctes: Vec<String> = defs
        .iter()
        .filter_map(|t| {
            scope
                .predicate(t, "s", 1)
                .map(|p| format!("{name} AS (SELECT * FROM {name} s WHERE {pred})", name = t.name, pred = p.sql))
        })
        .collect();
    if ctes.is_empty() {
        return sql.to_string();
    }
    let shadow = ctes.join(", ");

    match WITH_PREFIX.captures(sql) {
        // A recursive list would let the shadows reference themselves.
        Some(c) if c.get(1).is_some() => {
            format!("WITH {shadow} SELECT * FROM ({sql}) AS scoped")
        }
        Some(c) => {
            let rest = &sql[c.get(0).map_or(0, |m| m.end())..];
            format!("WITH {shadow}, {rest}")
        }
        None => format!("WITH {shadow} {sql}"),
    }
}

pub struct SqlGenerator {
    llm: Arc<dyn CompletionProvider>,
    max_rows: usize,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn CompletionProvider>, max_rows: usize) -> Self {
        Self { llm, max_rows }
    }

    pub async fn generate(
        &self,
        question: &str,
        intent: &QueryIntent,
        scope: &AccessScope,
    ) -> Result<GeneratedSql> {
        if intent.intent == IntentKind::List {
            let generated = template_sql(intent, scope, self.max_rows);
            debug!(sql = %generated.sql, "template SQL");
            return Ok(generated);
        }

        let request = CompletionRequest::new(SQL_SYSTEM_PROMPT, sql_prompt(question, intent, self.max_rows))
            .temperature(0.1)
            .max_tokens(800);
        let raw = self.llm.complete(&request).await?;
        let generated = finalize_llm_sql(&raw, scope, self.max_rows)?;
        info!(model = self.llm.model(), sql = %generated.sql, "LLM SQL generated");
        Ok(generated)
    }
}
