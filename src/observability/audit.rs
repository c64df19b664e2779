//! Agent Audit Log
//!
//! One entry per chat or classification call, written whether or not the
//! call succeeded.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Chat,
    Classification,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Chat => "chat",
            AgentType::Classification => "classification",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(AgentType::Chat),
            "classification" => Ok(AgentType::Classification),
            other => Err(AppError::Validation(format!("Unknown agent type '{other}'"))),
        }
    }
}

impl TryFrom<String> for AgentType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Audit entry, built up while the call runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub agent_type: AgentType,
    pub user_id: Option<Uuid>,
    pub input: String,
    pub generated_sql: Option<String>,
    pub response: Option<serde_json::Value>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(agent_type: AgentType, user_id: Option<Uuid>, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_type,
            user_id,
            input: input.into(),
            generated_sql: None,
            response: None,
            success: false,
            error_message: None,
            duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.generated_sql = Some(sql.into());
        self
    }

    pub fn with_success(mut self, response: serde_json::Value) -> Self {
        self.response = Some(response);
        self.success = true;
        self.error_message = None;
        self
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error_message = Some(error.to_string());
        self.success = false;
        self
    }

    pub fn finished(mut self, started: Instant) -> Self {
        self.duration_ms = started.elapsed().as_millis() as i64;
        self
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// Writes the entry and logs a failure instead of returning it.
pub async fn record_quietly(sink: &dyn AuditSink, entry: &AuditEntry) {
    if let Err(e) = sink.record(entry).await {
        warn!(
            audit_id = %entry.id,
            agent = %entry.agent_type,
            error = %e,
            "failed to write audit entry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _entry: &AuditEntry) -> Result<()> {
            Err(AppError::Config("audit table missing".into()))
        }
    }

    #[test]
    fn test_builder_flags() {
        let entry = AuditEntry::new(AgentType::Chat, None, "hi")
            .with_sql("SELECT 1")
            .with_error("boom");
        assert!(!entry.success);
        assert_eq!(entry.error_message.as_deref(), Some("boom"));

        let entry = entry.with_success(serde_json::json!({"answer": "ok"}));
        assert!(entry.success);
        assert!(entry.error_message.is_none());
        assert_eq!(entry.generated_sql.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!("Chat".parse::<AgentType>().unwrap(), AgentType::Chat);
        assert!("rca".parse::<AgentType>().is_err());
    }

    #[tokio::test]
    async fn test_record_quietly_swallows_errors() {
        let entry = AuditEntry::new(AgentType::Classification, None, "slack");
        record_quietly(&FailingSink, &entry).await;
    }
}
