//! Chat orchestration with auditing.

use crate::agent::explainer::Explainer;
use crate::agent::intent::QueryIntent;
use crate::agent::query_parser::QueryParser;
use crate::agent::sql_generator::{SqlGenerator, SqlSource};
use crate::agent::sql_validator;
use crate::agent::TeamDirectory;
use crate::error::{AppError, Result};
use crate::execution::{ExecutionContext, QueryBackend};
use crate::llm::CompletionProvider;
use crate::observability::{record_quietly, AgentType, AuditEntry, AuditSink};
use crate::security::{AccessScope, UserContext};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub intent: QueryIntent,
    pub sql: String,
    pub sql_source: SqlSource,
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub tables: Vec<String>,
    pub duration_ms: u64,
    pub audit_id: Uuid,
}

pub struct ChatAgent {
    parser: QueryParser,
    generator: SqlGenerator,
    explainer: Explainer,
    backend: Arc<dyn QueryBackend>,
    teams: Arc<dyn TeamDirectory>,
    audit: Arc<dyn AuditSink>,
    exec: ExecutionContext,
}

fn check_message(message: &str) -> Result<&str> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }
    let len = trimmed.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "message is {len} characters, the maximum is {MAX_MESSAGE_CHARS}"
        )));
    }
    Ok(trimmed)
}

impl ChatAgent {
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        backend: Arc<dyn QueryBackend>,
        teams: Arc<dyn TeamDirectory>,
        audit: Arc<dyn AuditSink>,
        exec: ExecutionContext,
    ) -> Self {
        Self {
            parser: QueryParser::new(llm.clone()),
            generator: SqlGenerator::new(llm.clone(), exec.max_rows),
            explainer: Explainer::new(llm),
            backend,
            teams,
            audit,
            exec,
        }
    }

    pub async fn ask(&self, user: &UserContext, message: &str) -> Result<ChatResponse> {
        self.ask_on(user, message, Local::now().date_naive()).await
    }

    /// Answers `message` with relative dates resolved against `today`.
    pub async fn ask_on(&self, user: &UserContext, message: &str, today: NaiveDate) -> Result<ChatResponse> {
        let started = Instant::now();
        let entry = AuditEntry::new(AgentType::Chat, Some(user.user_id), message);
        let audit_id = entry.id;

        let mut sql = None;
        let outcome = self.run(user, message, today, audit_id, &mut sql).await;

        let entry = match sql {
            Some(sql) => entry.with_sql(sql),
            None => entry,
        };
        let entry = match &outcome {
            Ok(response) => entry.with_success(json!({
                "answer": response.answer,
                "row_count": response.row_count,
                "tables": response.tables,
            })),
            Err(e) => {
                warn!(user = %user.user_id, error = %e, "chat request failed");
                entry.with_error(e)
            }
        };
        record_quietly(self.audit.as_ref(), &entry.finished(started)).await;
        outcome
    }

    async fn run(
        &self,
        user: &UserContext,
        message: &str,
        today: NaiveDate,
        audit_id: Uuid,
        sql_out: &mut Option<String>,
    ) -> Result<ChatResponse> {
        let question = check_message(message)?;
        let teams = self.teams.teams().await?;
        let intent = self.parser.parse(question, &teams, today).await?;

        let scope = AccessScope::for_user(user);
        let generated = self.generator.generate(question, &intent, &scope).await?;
        *sql_out = Some(generated.sql.clone());

        let validated = sql_validator::validate(&generated.sql)?;
        let result = self.backend.execute(&validated, &generated.params, self.exec).await?;
        let answer = self.explainer.explain(question, &intent, &validated.sql, &result).await;

        info!(
            user = %user.user_id,
            role = %user.role,
            source = ?generated.source,
            rows = result.row_count,
            duration_ms = result.duration_ms,
            "chat answered"
        );

        Ok(ChatResponse {
            answer,
            intent,
            sql: validated.sql,
            sql_source: generated.source,
            row_count: result.row_count,
            rows: result.rows,
            tables: result.tables,
            duration_ms: result.duration_ms,
            audit_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_checks() {
        assert!(matches!(check_message("   "), Err(AppError::Validation(_))));
        assert!(matches!(check_message(&"x".repeat(1001)), Err(AppError::Validation(_))));
        assert_eq!(check_message("  list users ").unwrap(), "list users");
        assert!(check_message(&"é".repeat(1000)).is_ok());
    }
}
