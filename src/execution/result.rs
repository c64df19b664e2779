//! Query Result - rows returned from the analytics store

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in SELECT order
    pub columns: Vec<String>,

    /// One JSON object per row
    pub rows: Vec<Value>,

    pub row_count: usize,

    /// Tables referenced by the query
    pub tables: Vec<String>,

    pub duration_ms: u64,

    /// True when rows were dropped to honour the row cap
    pub truncated: bool,
}

impl QueryResult {
    /// Builds a result from a JSON array of row objects, capping at `max_rows`.
    pub fn from_json_rows(value: Value, tables: Vec<String>, max_rows: usize, duration_ms: u64) -> Self {
        let mut rows = match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        };

        let truncated = rows.len() > max_rows;
        rows.truncate(max_rows);

        let columns = rows
            .first()
            .and_then(Value::as_object)
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();

        Self {
            row_count: rows.len(),
            columns,
            rows,
            tables,
            duration_ms,
            truncated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Single value of a 1x1 result.
    pub fn scalar(&self) -> Option<&Value> {
        if self.rows.len() != 1 || self.columns.len() != 1 {
            return None;
        }
        self.rows[0].get(&self.columns[0])
    }
}
