//! Natural-language chat agent: parse, generate SQL, validate, execute, explain.

pub mod chat;
pub mod explainer;
pub mod intent;
pub mod prompts;
pub mod query_parser;
pub mod sql_generator;
pub mod sql_repair;
pub mod sql_validator;
pub mod time;

pub use chat::{ChatAgent, ChatResponse, MAX_MESSAGE_CHARS};
pub use intent::{EntityKind, Filter, FilterOp, IntentKind, QueryIntent, TeamRef};
pub use sql_generator::{GeneratedSql, SqlGenerator, SqlSource};
pub use sql_validator::{validate, ValidatedQuery};
pub use time::DateRange;

use crate::error::Result;
use async_trait::async_trait;

/// Known teams, used to resolve team names mentioned in questions.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn teams(&self) -> Result<Vec<TeamRef>>;
}
