//! Persistence contract for the classification workflow.

use crate::classification::types::{
    ClassificationKey, ClassificationRule, NewFeedback, NewPending, NewRule, PendingClassification,
    Productivity, ReviewDecision, ReviewStats, UsageProfile,
};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ClassificationStore: Send + Sync {
    /// Rule with exactly this app/team/role scope.
    async fn find_rule(&self, key: &ClassificationKey) -> Result<Option<ClassificationRule>>;

    /// Pending (unreviewed) item for this key.
    async fn find_pending(&self, key: &ClassificationKey) -> Result<Option<PendingClassification>>;

    async fn get_pending(&self, id: Uuid) -> Result<Option<PendingClassification>>;

    /// Usage of `app_name` over the last `days` days.
    async fn usage_profile(&self, app_name: &str, days: i64) -> Result<UsageProfile>;

    /// Review outcomes for items suggested as `label` over the last `days` days.
    async fn review_stats(&self, label: Productivity, days: i64) -> Result<ReviewStats>;

    async fn upsert_rule(&self, rule: &NewRule) -> Result<ClassificationRule>;

    async fn insert_pending(&self, pending: &NewPending) -> Result<PendingClassification>;

    /// Moves a pending item to approved/rejected. Fails with `Conflict`
    /// when the item is no longer pending.
    async fn complete_review(&self, decision: &ReviewDecision) -> Result<PendingClassification>;

    /// Approves a pending item, saves its rule and, for overrides, records
    /// the feedback row. Either every step is stored or none is.
    async fn approve_review(
        &self,
        decision: &ReviewDecision,
        rule: &NewRule,
        feedback: Option<&NewFeedback>,
    ) -> Result<ClassificationRule>;
}
