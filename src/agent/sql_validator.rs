//! Read-only guard for SQL that reaches the database.

use crate::error::{AppError, Result};
use crate::schema;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlparser::ast::{visit_relations, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::warn;

lazy_static! {
    static ref LEADING_KEYWORD: Regex = Regex::new(r"(?i)^\s*(SELECT|WITH)\b").unwrap();
    static ref FORBIDDEN_KEYWORD: Regex = Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE|GRANT|REVOKE|COPY|EXECUTE|EXEC|CALL|MERGE|VACUUM|ANALYZE|LOCK|COMMENT|REINDEX|CLUSTER|LISTEN|NOTIFY|DO|PREPARE|DEALLOCATE|DISCARD|REFRESH|IMPORT|INTO|SET)\b"
    )
    .unwrap();
    static ref FORBIDDEN_FUNCTION: Regex =
        Regex::new(r"(?i)\b(pg_\w+|lo_\w+|dblink\w*|set_config|current_setting|query_to_xml\w*)\s*\(").unwrap();
    static ref CTE_NAME: Regex = Regex::new(
        r#"(?i)(?:\bWITH\s+(?:RECURSIVE\s+)?|,\s*)"?([A-Za-z_][A-Za-z0-9_]*)"?\s*(?:\([^()]*\)\s*)?AS\s*(?:NOT\s+)?(?:MATERIALIZED\s*)?\("#
    )
    .unwrap();
}

/// Set-returning functions allowed in FROM.
const TABLE_FUNCTIONS: &[&str] = &["generate_series", "unnest"];

/// SQL that passed every check, with the schema tables it reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedQuery {
    pub sql: String,
    pub tables: Vec<String>,
}

fn reject(reason: impl Into<String>) -> AppError {
    let reason = reason.into();
    warn!(%reason, "rejected SQL");
    AppError::UnsafeSql(reason)
}

pub fn validate(sql: &str) -> Result<ValidatedQuery> {
    let sql = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if sql.is_empty() {
        return Err(reject("empty statement"));
    }

    let masked = mask_string_literals(sql);
    if masked.contains(';') {
        return Err(reject("multiple statements are not allowed"));
    }
    if masked.contains("--") || masked.contains("/*") {
        return Err(reject("comments are not allowed"));
    }
    if !LEADING_KEYWORD.is_match(&masked) {
        return Err(reject("only SELECT queries are allowed"));
    }
    if let Some(m) = FORBIDDEN_KEYWORD.find(&masked) {
        return Err(reject(format!("forbidden keyword: {}", m.as_str().to_uppercase())));
    }
    if let Some(c) = FORBIDDEN_FUNCTION.captures(&masked) {
        return Err(reject(format!("forbidden function: {}", &c[1])));
    }

    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| reject(format!("SQL does not parse: {e}")))?;
    if statements.len() != 1 {
        return Err(reject("exactly one statement is required"));
    }
    if !matches!(statements[0], Statement::Query(_)) {
        return Err(reject("only SELECT queries are allowed"));
    }

    let ctes = cte_names(sql);
    let mut tables: Vec<String> = Vec::new();
    let mut problem: Option<String> = None;
    let _ = visit_relations(&statements, |relation| {
        if relation.0.len() > 1 {
            problem = Some(format!("schema-qualified names are not allowed: {relation}"));
            return ControlFlow::Break(());
        }
        let name = relation
            .0
            .first()
            .map(|ident| ident.value.to_lowercase())
            .unwrap_or_default();
        if schema::is_known_table(&name) {
            if !tables.contains(&name) {
                tables.push(name);
            }
        } else if !ctes.contains(&name) && !TABLE_FUNCTIONS.contains(&name.as_str()) {
            problem = Some(format!("table not allowed: {name}"));
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    });
    if let Some(reason) = problem {
        return Err(reject(reason));
    }

    Ok(ValidatedQuery {
        sql: sql.to_string(),
        tables,
    })
}

/// Lower-cased names of every CTE defined anywhere in `sql`.
pub fn cte_names(sql: &str) -> HashSet<String> {
    CTE_NAME
        .captures_iter(&mask_string_literals(sql))
        .map(|c| c[1].to_lowercase())
        .collect()
}

/// Replaces the contents of single-quoted literals with spaces, keeping
/// byte offsets stable.
fn mask_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    for c in sql.chars() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
        } else if in_literal {
            for _ in 0..c.len_utf8() {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
    out
}
