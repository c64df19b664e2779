//! Classification workflow: classify, auto-approve or queue, review.

use crate::classification::classifier::AppClassifier;
use crate::classification::store::ClassificationStore;
use crate::classification::threshold::{ThresholdPolicy, REVIEW_WINDOW_DAYS};
use crate::classification::types::{
    ClassificationKey, ClassificationOutcome, ClassificationRule, ClassifyRequest, NewFeedback,
    NewPending, NewRule, PendingClassification, Productivity, ReviewDecision, ReviewStatus,
    RuleSource, UsageProfile,
};
use crate::error::{AppError, Result};
use crate::llm::CompletionProvider;
use crate::observability::{record_quietly, AgentType, AuditEntry, AuditSink};
use crate::security::{Role, UserContext};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Usage history shown to the LLM.
pub const USAGE_WINDOW_DAYS: i64 = 30;

/// Body of a manual rule create/update.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualRuleRequest {
    pub app_name: String,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub role: Option<String>,
    pub classification: Productivity,
    #[serde(default)]
    pub reasoning: Option<String>,
}

pub struct ClassificationService {
    store: Arc<dyn ClassificationStore>,
    classifier: AppClassifier,
    policy: ThresholdPolicy,
    audit: Arc<dyn AuditSink>,
}

fn describe_scope(key: &ClassificationKey) -> String {
    match (&key.team_id, &key.role) {
        (None, None) => "all teams and roles".to_string(),
        (Some(team), None) => format!("team {team}, all roles"),
        (None, Some(role)) => format!("all teams, role '{role}'"),
        (Some(team), Some(role)) => format!("team {team}, role '{role}'"),
    }
}

/// Team a caller may create rules or queue items for.
fn writable_team(user: &UserContext, requested: Option<Uuid>) -> Result<Option<Uuid>> {
    match user.role {
        Role::Admin => Ok(requested),
        Role::Manager => {
            let team = requested.or(user.team_id);
            if team.is_some() && team == user.team_id {
                Ok(team)
            } else {
                Err(AppError::Forbidden(
                    "managers can only classify applications for their own team".to_string(),
                ))
            }
        }
        Role::Employee => Err(AppError::Forbidden("manager or admin role required".to_string())),
    }
}

impl ClassificationService {
    pub fn new(
        store: Arc<dyn ClassificationStore>,
        llm: Arc<dyn CompletionProvider>,
        policy: ThresholdPolicy,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            classifier: AppClassifier::new(llm),
            policy,
            audit,
        }
    }

    pub async fn analyze_usage(&self, app_name: &str) -> Result<UsageProfile> {
        let key = ClassificationKey::new(app_name, None, None)?;
        self.store.usage_profile(&key.app_name, USAGE_WINDOW_DAYS).await
    }

    pub async fn classify(&self, user: &UserContext, request: ClassifyRequest) -> Result<ClassificationOutcome> {
        let started = Instant::now();
        let entry = AuditEntry::new(
            AgentType::Classification,
            Some(user.user_id),
            json!({
                "app_name": request.app_name,
                "team_id": request.team_id,
                "role": request.role,
                "force": request.force,
            })
            .to_string(),
        );

        let outcome = self.run_classify(user, &request).await;
        let entry = match &outcome {
            Ok(outcome) => entry.with_success(serde_json::to_value(outcome).unwrap_or(Value::Null)),
            Err(e) => {
                warn!(app = %request.app_name, error = %e, "classification failed");
                entry.with_error(e)
            }
        };
        record_quietly(self.audit.as_ref(), &entry.finished(started)).await;
        outcome
    }

    async fn run_classify(&self, user: &UserContext, request: &ClassifyRequest) -> Result<ClassificationOutcome> {
        user.require_reviewer()?;
        let team_id = writable_team(user, request.team_id)?;
        let key = ClassificationKey::new(&request.app_name, team_id, request.role.as_deref())?;

        if !request.force {
            if let Some(rule) = self.store.find_rule(&key).await? {
                return Ok(ClassificationOutcome::ExistingRule { rule });
            }
        }
        if let Some(pending) = self.store.find_pending(&key).await? {
            return Ok(ClassificationOutcome::AlreadyPending { pending });
        }

        let profile = self.store.usage_profile(&key.app_name, USAGE_WINDOW_DAYS).await?;
        let suggestion = self
            .classifier
            .suggest(&key.app_name, &describe_scope(&key), &profile)
            .await?;
        let stats = self
            .store
            .review_stats(suggestion.classification, REVIEW_WINDOW_DAYS)
            .await?;
        let threshold = self.policy.threshold(&stats);

        if suggestion.confidence >= threshold {
            let rule = self
                .store
                .upsert_rule(&NewRule {
                    key,
                    classification: suggestion.classification,
                    confidence: suggestion.confidence,
                    reasoning: Some(suggestion.reasoning),
                    source: RuleSource::Llm,
                })
                .await?;
            info!(
                app = %rule.app_name,
                label = %rule.classification,
                confidence = rule.confidence,
                threshold,
                "classification auto-approved"
            );
            Ok(ClassificationOutcome::AutoApproved { rule, threshold })
        } else {
            let pending = self
                .store
                .insert_pending(&NewPending {
                    key,
                    suggestion,
                    requested_by: Some(user.user_id),
                })
                .await?;
            info!(
                app = %pending.app_name,
                label = %pending.suggested_classification,
                confidence = pending.confidence,
                threshold,
                "classification queued for review"
            );
            Ok(ClassificationOutcome::PendingReview { pending, threshold })
        }
    }

    /// Loads an item the caller may review. Global items are admin-only.
    async fn reviewable(&self, user: &UserContext, id: Uuid) -> Result<PendingClassification> {
        user.require_reviewer()?;
        let pending = self
            .store
            .get_pending(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pending classification {id} not found")))?;

        match pending.team_id {
            None => user.require_admin()?,
            Some(team) if !user.can_manage_team(Some(team)) => {
                return Err(AppError::Forbidden(
                    "managers can only review their own team's classifications".to_string(),
                ))
            }
            Some(_) => {}
        }
        if pending.status != ReviewStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Classification {id} is already {}",
                pending.status.as_str()
            )));
        }
        Ok(pending)
    }

    pub async fn approve(
        &self,
        user: &UserContext,
        id: Uuid,
        override_label: Option<Productivity>,
    ) -> Result<ClassificationRule> {
        let pending = self.reviewable(user, id).await?;
        let suggested = pending.suggested_classification;
        let final_label = override_label.unwrap_or(suggested);
        let overridden = final_label != suggested;

        let decision = ReviewDecision {
            id,
            status: ReviewStatus::Approved,
            reviewer_id: user.user_id,
            final_classification: Some(final_label),
            note: None,
        };
        let (source, confidence, reasoning) = if overridden {
            (
                RuleSource::Manual,
                1.0,
                Some(format!("Set by reviewer; suggested {suggested}")),
            )
        } else {
            (RuleSource::Approved, pending.confidence, pending.reasoning.clone())
        };
        let new_rule = NewRule {
            key: ClassificationKey {
                app_name: pending.app_name.clone(),
                team_id: pending.team_id,
                role: pending.role.clone(),
            },
            classification: final_label,
            confidence,
            reasoning,
            source,
        };
        let feedback = overridden.then(|| NewFeedback {
            pending_id: id,
            app_name: pending.app_name.clone(),
            team_id: pending.team_id,
            original: suggested,
            corrected: final_label,
            reviewer_id: user.user_id,
        });

        let rule = self
            .store
            .approve_review(&decision, &new_rule, feedback.as_ref())
            .await?;

        info!(%id, app = %rule.app_name, label = %final_label, overridden, "classification approved");
        Ok(rule)
    }

    pub async fn reject(&self, user: &UserContext, id: Uuid, reason: Option<String>) -> Result<PendingClassification> {
        self.reviewable(user, id).await?;
        let rejected = self
            .store
            .complete_review(&ReviewDecision {
                id,
                status: ReviewStatus::Rejected,
                reviewer_id: user.user_id,
                final_classification: None,
                note: reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            })
            .await?;
        info!(%id, app = %rejected.app_name, "classification rejected");
        Ok(rejected)
    }

    /// Creates or replaces a rule by hand.
    pub async fn save_manual_rule(&self, user: &UserContext, request: ManualRuleRequest) -> Result<ClassificationRule> {
        user.require_reviewer()?;
        let team_id = writable_team(user, request.team_id)?;
        let key = ClassificationKey::new(&request.app_name, team_id, request.role.as_deref())?;
        let rule = self
            .store
            .upsert_rule(&NewRule {
                key,
                classification: request.classification,
                confidence: 1.0,
                reasoning: request.reasoning.filter(|r| !r.trim().is_empty()),
                source: RuleSource::Manual,
            })
            .await?;
        info!(app = %rule.app_name, label = %rule.classification, "manual rule saved");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, team_id: Option<Uuid>) -> UserContext {
        UserContext {
            user_id: Uuid::new_v4(),
            email: "r@example.com".into(),
            name: "R".into(),
            role,
            team_id,
        }
    }

    #[test]
    fn test_writable_team() {
        let team = Uuid::new_v4();
        let other = Uuid::new_v4();
        let manager = user(Role::Manager, Some(team));
        assert_eq!(writable_team(&manager, None).unwrap(), Some(team));
        assert_eq!(writable_team(&manager, Some(team)).unwrap(), Some(team));
        assert!(writable_team(&manager, Some(other)).is_err());
        assert!(writable_team(&user(Role::Manager, None), None).is_err());
        assert_eq!(writable_team(&user(Role::Admin, None), None).unwrap(), None);
        assert!(writable_team(&user(Role::Employee, Some(team)), None).is_err());
    }

    #[test]
    fn test_scope_description() {
        let key = ClassificationKey::new("Figma", None, Some("designer")).unwrap();
        assert_eq!(describe_scope(&key), "all teams, role 'designer'");
    }
}
