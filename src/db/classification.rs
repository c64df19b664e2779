//! PostgreSQL-backed classification store plus rule and review listings.

use crate::classification::{
    ClassificationFeedback, ClassificationKey, ClassificationRule, ClassificationStore, NewFeedback,
    NewPending, NewRule, PendingClassification, Productivity, ReviewDecision, ReviewStats, ReviewStatus,
    UsageProfile,
};
use crate::db::{constraint_error, page_limit};
use crate::error::{AppError, Result};
use crate::execution::{bind_all, SelectBuilder};
use crate::security::AccessScope;
use async_trait::async_trait;
use chrono::{Duration, Local, Utc};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

const RULE_COLUMNS: &str = "r.id, r.app_name, r.team_id, r.role, r.classification, r.confidence, \
     r.reasoning, r.source, r.created_at, r.updated_at";
const PENDING_COLUMNS: &str = "pc.id, pc.app_name, pc.team_id, pc.role, pc.suggested_classification, \
     pc.confidence, pc.reasoning, pc.status, pc.requested_by, pc.reviewed_by, pc.final_classification, \
     pc.review_note, pc.created_at, pc.reviewed_at";
const FEEDBACK_COLUMNS: &str = "f.id, f.pending_id, f.app_name, f.team_id, f.original_classification, \
     f.corrected_classification, f.reviewer_id, f.created_at";

const SAME_KEY: &str = "app_name = $1 AND team_id IS NOT DISTINCT FROM $2 AND role IS NOT DISTINCT FROM $3";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFilter {
    pub classification: Option<Productivity>,
    /// Substring match on the application name.
    pub app_name: Option<String>,
    pub team_id: Option<Uuid>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingFilter {
    pub status: Option<ReviewStatus>,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct PgClassificationStore {
    pool: PgPool,
}

impl PgClassificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<ClassificationRule>> {
        let mut query = SelectBuilder::new(format!("SELECT {RULE_COLUMNS} FROM classification_rules r"));
        if let Some(label) = filter.classification {
            query.filter("r.classification", "=", label.as_str());
        }
        if let Some(app) = filter.app_name.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            let escaped = app.to_lowercase().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            query.filter("r.app_name", "LIKE", format!("%{escaped}%"));
        }
        if let Some(team_id) = filter.team_id {
            query.filter("r.team_id", "=", team_id);
        }
        query
            .order_by("r.app_name, r.team_id NULLS FIRST, r.role NULLS FIRST")
            .limit(page_limit(filter.limit, 200, 2000));
        let (sql, params) = query.build();
        let rules = bind_all(sqlx::query_as::<_, ClassificationRule>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rules)
    }

    pub async fn get_rule(&self, id: Uuid) -> Result<ClassificationRule> {
        sqlx::query_as::<_, ClassificationRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM classification_rules r WHERE r.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Classification rule {id} not found")))
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM classification_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Classification rule {id} not found")));
        }
        Ok(())
    }

    /// Review queue. Team scopes see their own team's items; a user scope
    /// sees nothing because only reviewers reach this listing.
    pub async fn list_pending(&self, scope: &AccessScope, filter: &PendingFilter) -> Result<Vec<PendingClassification>> {
        let mut query = SelectBuilder::new(format!("SELECT {PENDING_COLUMNS} FROM pending_classifications pc"));
        query.filter(
            "pc.status",
            "=",
            filter.status.unwrap_or(ReviewStatus::Pending).as_str(),
        );
        match scope {
            AccessScope::All => {}
            AccessScope::Team(team) => {
                query.filter("pc.team_id", "=", *team);
            }
            AccessScope::User(_) => {
                query.condition("FALSE");
            }
        }
        query
            .order_by("pc.created_at DESC")
            .limit(page_limit(filter.limit, 100, 1000));
        let (sql, params) = query.build();
        let items = bind_all(sqlx::query_as::<_, PendingClassification>(&sql), &params)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    pub async fn list_feedback(&self, limit: Option<u32>) -> Result<Vec<ClassificationFeedback>> {
        let feedback = sqlx::query_as::<_, ClassificationFeedback>(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM classification_feedback f ORDER BY f.created_at DESC LIMIT $1"
        ))
        .bind(i64::from(page_limit(limit, 100, 1000)))
        .fetch_all(&self.pool)
        .await?;
        Ok(feedback)
    }
}

#[async_trait]
impl ClassificationStore for PgClassificationStore {
    async fn find_rule(&self, key: &ClassificationKey) -> Result<Option<ClassificationRule>> {
        let rule = sqlx::query_as::<_, ClassificationRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM classification_rules r WHERE r.{SAME_KEY}"
        ))
        .bind(&key.app_name)
        .bind(key.team_id)
        .bind(&key.role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rule)
    }

    async fn find_pending(&self, key: &ClassificationKey) -> Result<Option<PendingClassification>> {
        let pending = sqlx::query_as::<_, PendingClassification>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_classifications pc \
             WHERE pc.{SAME_KEY} AND pc.status = 'pending' ORDER BY pc.created_at DESC LIMIT 1"
        ))
        .bind(&key.app_name)
        .bind(key.team_id)
        .bind(&key.role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn get_pending(&self, id: Uuid) -> Result<Option<PendingClassification>> {
        let pending = sqlx::query_as::<_, PendingClassification>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_classifications pc WHERE pc.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn usage_profile(&self, app_name: &str, days: i64) -> Result<UsageProfile> {
        let since = Local::now().date_naive() - Duration::days(days);
        let (total_seconds, distinct_users, active_days, avg_session_seconds): (i64, i64, i64, f64) =
            sqlx::query_as(
                "SELECT COALESCE(SUM(au.duration_seconds), 0)::bigint, \
                 COUNT(DISTINCT au.user_id), \
                 COUNT(DISTINCT au.date), \
                 COALESCE(SUM(au.duration_seconds)::float8 / NULLIF(SUM(au.session_count), 0), 0)::float8 \
                 FROM app_usage au WHERE LOWER(au.app_name) = $1 AND au.date >= $2",
            )
            .bind(app_name)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        let top_teams: Vec<String> = sqlx::query_scalar(
            "SELECT t.name FROM app_usage au \
             JOIN users u ON u.id = au.user_id JOIN teams t ON t.id = u.team_id \
             WHERE LOWER(au.app_name) = $1 AND au.date >= $2 \
             GROUP BY t.name ORDER BY SUM(au.duration_seconds) DESC LIMIT 3",
        )
        .bind(app_name)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let sample_titles: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT au.window_title FROM app_usage au \
             WHERE LOWER(au.app_name) = $1 AND au.date >= $2 \
             AND au.window_title IS NOT NULL AND au.window_title <> '' LIMIT 5",
        )
        .bind(app_name)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(UsageProfile {
            app_name: app_name.to_string(),
            total_seconds,
            distinct_users,
            active_days,
            avg_session_seconds,
            top_teams,
            sample_titles,
        })
    }

    async fn review_stats(&self, label: Productivity, days: i64) -> Result<ReviewStats> {
        let since = Utc::now() - Duration::days(days);
        let (reviewed, rejected): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE status IN ('approved', 'rejected')), \
             COUNT(*) FILTER (WHERE status = 'rejected') \
             FROM pending_classifications \
             WHERE suggested_classification = $1 AND reviewed_at >= $2",
        )
        .bind(label.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        let overridden: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM classification_feedback \
             WHERE original_classification = $1 AND created_at >= $2",
        )
        .bind(label.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReviewStats {
            reviewed,
            rejected,
            overridden,
        })
    }

    async fn upsert_rule(&self, rule: &NewRule) -> Result<ClassificationRule> {
        let mut tx = self.pool.begin().await?;
        let saved = save_rule(&mut tx, rule).await?;
        tx.commit().await?;
        debug!(app = %saved.app_name, source = saved.source.as_str(), "rule saved");
        Ok(saved)
    }

    async fn insert_pending(&self, pending: &NewPending) -> Result<PendingClassification> {
        let item = sqlx::query_as::<_, PendingClassification>(&format!(
            "INSERT INTO pending_classifications AS pc \
             (id, app_name, team_id, role, suggested_classification, confidence, reasoning, status, requested_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, NOW()) RETURNING {PENDING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&pending.key.app_name)
        .bind(pending.key.team_id)
        .bind(&pending.key.role)
        .bind(pending.suggestion.classification.as_str())
        .bind(pending.suggestion.confidence)
        .bind(&pending.suggestion.reasoning)
        .bind(pending.requested_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "pending classification"))?;
        Ok(item)
    }

    async fn complete_review(&self, decision: &ReviewDecision) -> Result<PendingClassification> {
        let mut conn = self.pool.acquire().await?;
        match mark_reviewed(&mut conn, decision).await? {
            Some(item) => Ok(item),
            None => Err(self.review_conflict(decision.id).await),
        }
    }

    async fn approve_review(
        &self,
        decision: &ReviewDecision,
        rule: &NewRule,
        feedback: Option<&NewFeedback>,
    ) -> Result<ClassificationRule> {
        let mut tx = self.pool.begin().await?;
        if mark_reviewed(&mut tx, decision).await?.is_none() {
            tx.rollback().await?;
            return Err(self.review_conflict(decision.id).await);
        }
        let saved = save_rule(&mut tx, rule).await?;
        if let Some(feedback) = feedback {
            insert_feedback(&mut tx, feedback).await?;
        }
        tx.commit().await?;
        debug!(id = %decision.id, app = %saved.app_name, "review approved");
        Ok(saved)
    }
}

impl PgClassificationStore {
    /// Explains why a review update matched no pending row.
    async fn review_conflict(&self, id: Uuid) -> AppError {
        match self.get_pending(id).await {
            Ok(Some(item)) => AppError::Conflict(format!(
                "Classification {} is already {}",
                item.id,
                item.status.as_str()
            )),
            Ok(None) => AppError::NotFound(format!("Pending classification {id} not found")),
            Err(e) => e,
        }
    }
}

async fn mark_reviewed(conn: &mut PgConnection, decision: &ReviewDecision) -> Result<Option<PendingClassification>> {
    let reviewed = sqlx::query_as::<_, PendingClassification>(&format!(
        "UPDATE pending_classifications AS pc SET status = $2, reviewed_by = $3, \
         final_classification = $4, review_note = $5, reviewed_at = NOW() \
         WHERE pc.id = $1 AND pc.status = 'pending' RETURNING {PENDING_COLUMNS}"
    ))
    .bind(decision.id)
    .bind(decision.status.as_str())
    .bind(decision.reviewer_id)
    .bind(decision.final_classification.map(|p| p.as_str()))
    .bind(&decision.note)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(reviewed)
}

/// Update-then-insert: NULL team/role scopes never collide under a plain
/// unique index, so `ON CONFLICT` cannot find the existing row.
async fn save_rule(conn: &mut PgConnection, rule: &NewRule) -> Result<ClassificationRule> {
    let updated = sqlx::query_as::<_, ClassificationRule>(&format!(
        "UPDATE classification_rules AS r SET classification = $4, confidence = $5, reasoning = $6, \
         source = $7, updated_at = NOW() WHERE r.{SAME_KEY} RETURNING {RULE_COLUMNS}"
    ))
    .bind(&rule.key.app_name)
    .bind(rule.key.team_id)
    .bind(&rule.key.role)
    .bind(rule.classification.as_str())
    .bind(rule.confidence)
    .bind(&rule.reasoning)
    .bind(rule.source.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(existing) => Ok(existing),
        None => sqlx::query_as::<_, ClassificationRule>(&format!(
            "INSERT INTO classification_rules AS r \
             (id, app_name, team_id, role, classification, confidence, reasoning, source, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) RETURNING {RULE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&rule.key.app_name)
        .bind(rule.key.team_id)
        .bind(&rule.key.role)
        .bind(rule.classification.as_str())
        .bind(rule.confidence)
        .bind(&rule.reasoning)
        .bind(rule.source.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| constraint_error(e, "classification rule")),
    }
}

async fn insert_feedback(conn: &mut PgConnection, feedback: &NewFeedback) -> Result<()> {
    sqlx::query(
        "INSERT INTO classification_feedback \
         (id, pending_id, app_name, team_id, original_classification, corrected_classification, reviewer_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())",
    )
    .bind(Uuid::new_v4())
    .bind(feedback.pending_id)
    .bind(&feedback.app_name)
    .bind(feedback.team_id)
    .bind(feedback.original.as_str())
    .bind(feedback.corrected.as_str())
    .bind(feedback.reviewer_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| constraint_error(e, "classification feedback"))?;
    Ok(())
}
