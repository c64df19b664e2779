//! PostgreSQL execution backend.

use crate::agent::sql_validator::ValidatedQuery;
use crate::error::{AppError, Result};
use crate::execution::builder::bind_all_scalar;
use crate::execution::engine::{ExecutionContext, QueryBackend};
use crate::execution::result::QueryResult;
use crate::execution::SqlParam;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const STATEMENT_TIMEOUT_CODE: &str = "57014";

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_statement_timeout(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(STATEMENT_TIMEOUT_CODE),
        _ => false,
    }
}

#[async_trait]
impl QueryBackend for PgBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn execute(
        &self,
        query: &ValidatedQuery,
        params: &[SqlParam],
        ctx: ExecutionContext,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        // Aggregating inside the database keeps row decoding schema-agnostic.
        let wrapped = format!(
            "SELECT COALESCE(json_agg(q), '[]'::json) FROM ({}) AS q",
            query.sql
        );
        let statement_timeout = format!("SET LOCAL statement_timeout = {}", ctx.timeout.as_millis());

        let run = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await?;
            sqlx::query(&statement_timeout).execute(&mut *tx).await?;

            let rows = bind_all_scalar(sqlx::query_scalar::<_, Value>(&wrapped), params)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            Ok::<Value, sqlx::Error>(rows)
        };

        // Grace period so the server-side timeout normally fires first.
        let outer = ctx.timeout + Duration::from_millis(500);
        let rows = match tokio::time::timeout(outer, run).await {
            Err(_) => {
                warn!(timeout_ms = ctx.timeout.as_millis() as u64, "query exceeded outer timeout");
                return Err(AppError::QueryTimeout(ctx.timeout));
            }
            Ok(Err(e)) if is_statement_timeout(&e) => {
                warn!(timeout_ms = ctx.timeout.as_millis() as u64, "statement_timeout fired");
                return Err(AppError::QueryTimeout(ctx.timeout));
            }
            Ok(Err(e)) => return Err(AppError::Database(e)),
            Ok(Ok(rows)) => rows,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = QueryResult::from_json_rows(rows, query.tables.clone(), ctx.max_rows, duration_ms);
        debug!(
            rows = result.row_count,
            truncated = result.truncated,
            duration_ms,
            "query executed"
        );
        Ok(result)
    }
}
