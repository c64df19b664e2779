//! Read-only usage data: daily aggregates and per-app records.

use crate::db::page_limit;
use crate::error::{AppError, Result};
use crate::execution::{bind_all, SelectBuilder};
use crate::schema;
use crate::security::AccessScope;
use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const DEFAULT_RANGE_DAYS: i64 = 7;
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub limit: Option<u32>,
}

impl UsageQuery {
    /// Inclusive range; defaults to the last seven days ending `today`.
    pub fn range(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let end = self.end.unwrap_or(today);
        let start = self
            .start
            .unwrap_or_else(|| end - Duration::days(DEFAULT_RANGE_DAYS - 1));
        if start > end {
            return Err(AppError::Validation(format!("start {start} is after end {end}")));
        }
        if (end - start).num_days() + 1 > MAX_RANGE_DAYS {
            return Err(AppError::Validation(format!(
                "date range may span at most {MAX_RANGE_DAYS} days"
            )));
        }
        Ok((start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DailyUsage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub date: NaiveDate,
    pub active_seconds: i32,
    pub idle_seconds: i32,
    pub productive_seconds: i32,
    pub neutral_seconds: i32,
    pub unproductive_seconds: i32,
    pub first_activity_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct AppUsage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub app_name: String,
    pub window_title: Option<String>,
    pub duration_seconds: i32,
    pub session_count: i32,
    /// Label from a global rule, when one exists.
    pub classification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct UserUsageSummary {
    pub user_id: Uuid,
    pub user_name: String,
    pub team_id: Option<Uuid>,
    pub days_active: i64,
    pub active_seconds: i64,
    pub idle_seconds: i64,
    pub productive_seconds: i64,
    pub neutral_seconds: i64,
    pub unproductive_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub users: Vec<UserUsageSummary>,
}

#[derive(Clone)]
pub struct UsageRepository {
    pool: PgPool,
}

impl UsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    pub async fn daily(&self, scope: &AccessScope, query: &UsageQuery) -> Result<Vec<DailyUsage>> {
        let (start, end) = query.range(Self::today())?;
        let mut sql = SelectBuilder::new(
            "SELECT du.id, du.user_id, u.name AS user_name, du.date, du.active_seconds, du.idle_seconds, \
             du.productive_seconds, du.neutral_seconds, du.unproductive_seconds, \
             du.first_activity_at, du.last_activity_at \
             FROM daily_usage du JOIN users u ON u.id = du.user_id",
        );
        sql.filter("du.date", ">=", start).filter("du.date", "<=", end);
        if let Some(user_id) = query.user_id {
            sql.filter("du.user_id", "=", user_id);
        }
        if let Some(team_id) = query.team_id {
            sql.filter("u.team_id", "=", team_id);
        }
        sql.restrict(scope, &schema::DAILY_USAGE, "du")
            .order_by("du.date DESC, u.name")
            .limit(page_limit(query.limit, 500, 5000));

        let (sql, params) = sql.build();
        let rows = bind_all(sqlx::query_as::<_, DailyUsage>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn apps(&self, scope: &AccessScope, query: &UsageQuery) -> Result<Vec<AppUsage>> {
        let (start, end) = query.range(Self::today())?;
        let mut sql = SelectBuilder::new(
            "SELECT au.id, au.user_id, au.date, au.app_name, au.window_title, au.duration_seconds, \
             au.session_count, r.classification \
             FROM app_usage au JOIN users u ON u.id = au.user_id \
             LEFT JOIN classification_rules r \
             ON r.app_name = LOWER(au.app_name) AND r.team_id IS NULL AND r.role IS NULL",
        );
        sql.filter("au.date", ">=", start).filter("au.date", "<=", end);
        if let Some(user_id) = query.user_id {
            sql.filter("au.user_id", "=", user_id);
        }
        if let Some(team_id) = query.team_id {
            sql.filter("u.team_id", "=", team_id);
        }
        sql.restrict(scope, &schema::APP_USAGE, "au")
            .order_by("au.date DESC, au.duration_seconds DESC")
            .limit(page_limit(query.limit, 500, 5000));

        let (sql, params) = sql.build();
        let rows = bind_all(sqlx::query_as::<_, AppUsage>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Per-user totals over the range, busiest first.
    pub async fn summary(&self, scope: &AccessScope, query: &UsageQuery) -> Result<UsageSummary> {
        let (start, end) = query.range(Self::today())?;
        let mut sql = SelectBuilder::new(
            "SELECT u.id AS user_id, u.name AS user_name, u.team_id, \
             COUNT(du.id) FILTER (WHERE du.active_seconds > 0) AS days_active, \
             COALESCE(SUM(du.active_seconds), 0)::bigint AS active_seconds, \
             COALESCE(SUM(du.idle_seconds), 0)::bigint AS idle_seconds, \
             COALESCE(SUM(du.productive_seconds), 0)::bigint AS productive_seconds, \
             COALESCE(SUM(du.neutral_seconds), 0)::bigint AS neutral_seconds, \
             COALESCE(SUM(du.unproductive_seconds), 0)::bigint AS unproductive_seconds \
             FROM daily_usage du JOIN users u ON u.id = du.user_id",
        );
        sql.filter("du.date", ">=", start).filter("du.date", "<=", end);
        if let Some(user_id) = query.user_id {
            sql.filter("du.user_id", "=", user_id);
        }
        if let Some(team_id) = query.team_id {
            sql.filter("u.team_id", "=", team_id);
        }
        sql.restrict(scope, &schema::DAILY_USAGE, "du")
            .group_by("u.id, u.name, u.team_id")
            .order_by("active_seconds DESC, u.name")
            .limit(page_limit(query.limit, 500, 5000));

        let (sql, params) = sql.build();
        let users = bind_all(sqlx::query_as::<_, UserUsageSummary>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(UsageSummary { start, end, users })
    }
}
