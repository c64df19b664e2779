//! Parameterized SELECT construction with `$n` numbering.

use crate::execution::SqlParam;
use crate::schema::TableDef;
use crate::security::AccessScope;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::{QueryAs, QueryScalar};

#[derive(Debug, Clone)]
pub struct SelectBuilder {
    base: String,
    conditions: Vec<String>,
    params: Vec<SqlParam>,
    group_by: Option<String>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl SelectBuilder {
    /// `base` is everything up to and including the FROM/JOIN clauses.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            conditions: Vec::new(),
            params: Vec::new(),
            group_by: None,
            order_by: None,
            limit: None,
        }
    }

    /// Registers a parameter and returns its placeholder.
    pub fn bind(&mut self, value: impl Into<SqlParam>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    /// `expr <op> $n`
    pub fn filter(&mut self, expr: &str, op: &str, value: impl Into<SqlParam>) -> &mut Self {
        let placeholder = self.bind(value);
        self.conditions.push(format!("{expr} {op} {placeholder}"));
        self
    }

    /// Adds a condition that references no parameters.
    pub fn condition(&mut self, sql: impl Into<String>) -> &mut Self {
        self.conditions.push(sql.into());
        self
    }

    /// Adds the row-level access predicate for `table` under `alias`.
    pub fn restrict(&mut self, scope: &AccessScope, table: &TableDef, alias: &str) -> &mut Self {
        if let Some(predicate) = scope.predicate(table, alias, self.params.len() + 1) {
            self.conditions.push(predicate.sql);
            self.params.extend(predicate.params);
        }
        self
    }

    pub fn group_by(&mut self, sql: impl Into<String>) -> &mut Self {
        self.group_by = Some(sql.into());
        self
    }

    pub fn order_by(&mut self, sql: impl Into<String>) -> &mut Self {
        self.order_by = Some(sql.into());
        self
    }

    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(self) -> (String, Vec<SqlParam>) {
        let mut sql = self.base.trim_end().to_string();
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        if let Some(group_by) = self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_by);
        }
        if let Some(order_by) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        (sql, self.params)
    }
}

macro_rules! bind_sql_param {
    ($query:expr, $param:expr) => {
        match $param {
            SqlParam::Uuid(v) => $query.bind(*v),
            SqlParam::Text(v) => $query.bind(v.as_str()),
            SqlParam::Int(v) => $query.bind(*v),
            SqlParam::Float(v) => $query.bind(*v),
            SqlParam::Bool(v) => $query.bind(*v),
            SqlParam::Date(v) => $query.bind(*v),
        }
    };
}

/// Binds every parameter to a `query_as` in order.
pub fn bind_all<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &'q [SqlParam],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for param in params {
        query = bind_sql_param!(query, param);
    }
    query
}

/// Binds every parameter to a `query_scalar` in order.
pub fn bind_all_scalar<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    params: &'q [SqlParam],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for param in params {
        query = bind_sql_param!(query, param);
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use uuid::Uuid;

    #[test]
    fn test_placeholders_follow_bind_order() {
        let team = Uuid::new_v4();
        let mut q = SelectBuilder::new("SELECT u.id FROM users u");
        q.filter("u.role", "=", "manager")
            .restrict(&AccessScope::Team(team), &schema::USERS, "u")
            .filter("u.name", "ILIKE", "%ann%")
            .order_by("u.name")
            .limit(100);
        let (sql, params) = q.build();

        assert_eq!(
            sql,
            "SELECT u.id FROM users u WHERE u.role = $1 AND u.team_id = $2 AND u.name ILIKE $3 ORDER BY u.name LIMIT 100"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(params[1], SqlParam::Uuid(team));
    }

    #[test]
    fn test_admin_scope_adds_nothing() {
        let mut q = SelectBuilder::new("SELECT t.id FROM teams t");
        q.restrict(&AccessScope::All, &schema::TEAMS, "t");
        let (sql, params) = q.build();
        assert_eq!(sql, "SELECT t.id FROM teams t");
        assert!(params.is_empty());
    }
}
