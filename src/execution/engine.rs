//! Execution backend trait - the contract between the chat agent and the store.

use crate::agent::sql_validator::ValidatedQuery;
use crate::error::Result;
use crate::execution::result::QueryResult;
use crate::execution::SqlParam;
use async_trait::async_trait;
use std::time::Duration;

/// Limits applied to a single execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    pub timeout: Duration,
    pub max_rows: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_rows: 1000,
        }
    }
}

#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Backend name (e.g., "postgres")
    fn name(&self) -> &'static str;

    /// Runs an already validated read-only query.
    async fn execute(
        &self,
        query: &ValidatedQuery,
        params: &[SqlParam],
        ctx: ExecutionContext,
    ) -> Result<QueryResult>;
}
