//! `agent_audit_log` persistence.

use crate::db::page_limit;
use crate::error::Result;
use crate::execution::{bind_all, SelectBuilder};
use crate::observability::{AgentType, AuditEntry, AuditSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditRecord {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub agent_type: AgentType,
    pub user_id: Option<Uuid>,
    pub input: String,
    pub generated_sql: Option<String>,
    pub response: Option<Value>,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub agent_type: Option<AgentType>,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub failures_only: bool,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent entries first.
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let mut query = SelectBuilder::new(
            "SELECT a.id, a.agent_type, a.user_id, a.input, a.generated_sql, a.response, a.success, \
             a.error_message, a.duration_ms, a.created_at FROM agent_audit_log a",
        );
        if let Some(agent_type) = filter.agent_type {
            query.filter("a.agent_type", "=", agent_type.as_str());
        }
        if let Some(user_id) = filter.user_id {
            query.filter("a.user_id", "=", user_id);
        }
        if filter.failures_only {
            query.condition("NOT a.success");
        }
        query
            .order_by("a.created_at DESC")
            .limit(page_limit(filter.limit, 50, 500));
        let (sql, params) = query.build();
        let records = bind_all(sqlx::query_as::<_, AuditRecord>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl AuditSink for AuditRepository {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_audit_log \
             (id, agent_type, user_id, input, generated_sql, response, success, error_message, duration_ms, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(entry.id)
        .bind(entry.agent_type.as_str())
        .bind(entry.user_id)
        .bind(&entry.input)
        .bind(&entry.generated_sql)
        .bind(&entry.response)
        .bind(entry.success)
        .bind(&entry.error_message)
        .bind(entry.duration_ms)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
