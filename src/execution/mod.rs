//! Query execution against the analytics store.

pub mod builder;
pub mod engine;
pub mod postgres;
pub mod result;

pub use builder::{bind_all, bind_all_scalar, SelectBuilder};
pub use engine::{ExecutionContext, QueryBackend};
pub use postgres::PgBackend;
pub use result::QueryResult;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// A bound query parameter (`$n` placeholder value).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl From<Uuid> for SqlParam {
    fn from(v: Uuid) -> Self {
        SqlParam::Uuid(v)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(v: NaiveDate) -> Self {
        SqlParam::Date(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}
