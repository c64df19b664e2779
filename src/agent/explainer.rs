//! Plain-English answers from query results.

use crate::agent::intent::{IntentKind, QueryIntent};
use crate::agent::prompts::{explain_prompt, EXPLAIN_SYSTEM_PROMPT};
use crate::execution::QueryResult;
use crate::llm::{CompletionProvider, CompletionRequest};
use itertools::Itertools;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Results up to this many rows are formatted without the LLM.
pub const DIRECT_ROW_LIMIT: usize = 5;
/// Rows shown to the LLM when explaining larger results.
pub const LLM_SAMPLE_ROWS: usize = 50;

pub struct Explainer {
    llm: Arc<dyn CompletionProvider>,
    direct_row_limit: usize,
}

impl Explainer {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            llm,
            direct_row_limit: DIRECT_ROW_LIMIT,
        }
    }

    pub fn with_direct_row_limit(mut self, limit: usize) -> Self {
        self.direct_row_limit = limit;
        self
    }

    pub async fn explain(&self, question: &str, intent: &QueryIntent, sql: &str, result: &QueryResult) -> String {
        if result.is_empty() {
            return no_data_message(intent);
        }
        if result.row_count <= self.direct_row_limit {
            return summarize(intent, result, self.direct_row_limit);
        }

        let sample: Vec<&Value> = result.rows.iter().take(LLM_SAMPLE_ROWS).collect();
        let sample_json = serde_json::to_string(&sample).unwrap_or_else(|_| "[]".to_string());
        let request = CompletionRequest::new(
            EXPLAIN_SYSTEM_PROMPT,
            explain_prompt(question, sql, result.row_count, &sample_json),
        )
        .temperature(0.3)
        .max_tokens(500);

        match self.llm.complete(&request).await {
            Ok(answer) if !answer.trim().is_empty() => {
                debug!(rows = result.row_count, "explained with LLM");
                answer.trim().to_string()
            }
            Ok(_) => summarize(intent, result, self.direct_row_limit),
            Err(e) => {
                warn!(error = %e, "LLM explanation failed, using template");
                summarize(intent, result, self.direct_row_limit)
            }
        }
    }
}

pub fn no_data_message(intent: &QueryIntent) -> String {
    let mut message = match &intent.date_range {
        Some(range) => format!("No matching data was found for {}.", range.describe()),
        None => "No matching data was found.".to_string(),
    };
    if let Some(team) = &intent.unmatched_team {
        message.push_str(&format!(" There is no team named \"{team}\"."));
    }
    message
}

/// Templated answer using at most `max_rows` rows.
pub fn summarize(intent: &QueryIntent, result: &QueryResult, max_rows: usize) -> String {
    let period = intent
        .date_range
        .as_ref()
        .map(|r| format!(" for {}", r.describe()))
        .unwrap_or_default();

    if let (Some(value), Some(column)) = (result.scalar(), result.columns.first()) {
        return format!("{}{}: {}.", column_label(column), period, format_value(column, value));
    }

    let header = if intent.intent == IntentKind::List {
        format!("Found {} {}{}:", result.row_count, intent.entity.noun(), period)
    } else {
        format!("Here are the results{}:", period)
    };
    let bullets = result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| format!("- {}", format_row(row)))
        .join("\n");

    let mut out = format!("{header}\n{bullets}");
    if result.row_count > max_rows {
        out.push_str(&format!("\n...and {} more rows.", result.row_count - max_rows));
    }
    if result.truncated {
        out.push_str("\n(Results were capped at the row limit.)");
    }
    out
}

fn format_row(row: &Value) -> String {
    match row.as_object() {
        Some(obj) => obj
            .iter()
            .map(|(k, v)| format!("{}: {}", column_label(k), format_value(k, v)))
            .join(", "),
        None => row.to_string(),
    }
}

fn column_label(column: &str) -> String {
    let base = match column.strip_suffix("_seconds") {
        Some(stem) if !stem.is_empty() => format!("{stem} time"),
        _ => column.to_string(),
    };
    let spaced = base.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

fn format_value(column: &str, value: &Value) -> String {
    match value {
        Value::Null => "n/a".to_string(),
        Value::Bool(b) => (if *b { "yes" } else { "no" }).to_string(),
        Value::Number(n) if column.ends_with("_seconds") => match n.as_f64() {
            Some(secs) => format!("{:.1} hours", secs / 3600.0),
            None => n.to_string(),
        },
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 => format!("{f:.0}"),
            (None, Some(f)) => format!("{f:.2}"),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
