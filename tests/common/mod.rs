//! In-memory stand-ins shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;
use workforce_analytics::agent::{TeamDirectory, TeamRef, ValidatedQuery};
use workforce_analytics::classification::{
    ClassificationKey, ClassificationRule, ClassificationStore, NewFeedback, NewPending, NewRule,
    PendingClassification, Productivity, ReviewDecision, ReviewStats, ReviewStatus, UsageProfile,
};
use workforce_analytics::execution::{ExecutionContext, QueryBackend, QueryResult, SqlParam};
use workforce_analytics::llm::{CompletionProvider, CompletionRequest};
use workforce_analytics::observability::{AuditEntry, AuditSink};
use workforce_analytics::security::{Role, UserContext, UserDirectory};
use workforce_analytics::{AppError, Result};

pub fn user(role: Role, team_id: Option<Uuid>) -> UserContext {
    UserContext {
        user_id: Uuid::new_v4(),
        email: format!("{}@example.com", role.as_str()),
        name: role.as_str().to_string(),
        role,
        team_id,
    }
}

/// Replies with canned completions in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::LlmUnavailable("no scripted reply left".into()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Returns fixed rows and remembers what it was asked to run.
pub struct FakeBackend {
    rows: serde_json::Value,
    pub executed: Mutex<Vec<(String, Vec<SqlParam>)>>,
}

impl FakeBackend {
    pub fn returning(rows: serde_json::Value) -> Self {
        Self {
            rows,
            executed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn execute(&self, query: &ValidatedQuery, params: &[SqlParam], ctx: ExecutionContext) -> Result<QueryResult> {
        self.executed
            .lock()
            .unwrap()
            .push((query.sql.clone(), params.to_vec()));
        Ok(QueryResult::from_json_rows(
            self.rows.clone(),
            query.tables.clone(),
            ctx.max_rows,
            2,
        ))
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    pub entries: Mutex<Vec<AuditEntry>>,
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

pub struct StaticTeams(pub Vec<TeamRef>);

#[async_trait]
impl TeamDirectory for StaticTeams {
    async fn teams(&self) -> Result<Vec<TeamRef>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct StaticUsers(pub HashMap<Uuid, UserContext>);

#[async_trait]
impl UserDirectory for StaticUsers {
    async fn find_active(&self, id: Uuid) -> Result<Option<UserContext>> {
        Ok(self.0.get(&id).cloned())
    }
}

/// Classification store backed by vectors.
#[derive(Default)]
pub struct MemoryStore {
    pub rules: Mutex<Vec<ClassificationRule>>,
    pub pending: Mutex<Vec<PendingClassification>>,
    pub feedback: Mutex<Vec<NewFeedback>>,
    pub stats: Mutex<HashMap<Productivity, ReviewStats>>,
    /// Makes every rule write fail, as a broken database would.
    pub fail_rule_writes: AtomicBool,
}

impl MemoryStore {
    fn write_rule(&self, rule: &NewRule) -> Result<ClassificationRule> {
        if self.fail_rule_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }
        let mut rules = self.rules.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = rules
            .iter_mut()
            .find(|r| same_key(&rule.key, &r.app_name, r.team_id, &r.role))
        {
            existing.classification = rule.classification;
            existing.confidence = rule.confidence;
            existing.reasoning = rule.reasoning.clone();
            existing.source = rule.source;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let saved = ClassificationRule {
            id: Uuid::new_v4(),
            app_name: rule.key.app_name.clone(),
            team_id: rule.key.team_id,
            role: rule.key.role.clone(),
            classification: rule.classification,
            confidence: rule.confidence,
            reasoning: rule.reasoning.clone(),
            source: rule.source,
            created_at: now,
            updated_at: now,
        };
        rules.push(saved.clone());
        Ok(saved)
    }
}

fn same_key(key: &ClassificationKey, app: &str, team: Option<Uuid>, role: &Option<String>) -> bool {
    key.app_name == app && key.team_id == team && &key.role == role
}

#[async_trait]
impl ClassificationStore for MemoryStore {
    async fn find_rule(&self, key: &ClassificationKey) -> Result<Option<ClassificationRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| same_key(key, &r.app_name, r.team_id, &r.role))
            .cloned())
    }

    async fn find_pending(&self, key: &ClassificationKey) -> Result<Option<PendingClassification>> {
        Ok(self
            .pending
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.status == ReviewStatus::Pending && same_key(key, &p.app_name, p.team_id, &p.role))
            .cloned())
    }

    async fn get_pending(&self, id: Uuid) -> Result<Option<PendingClassification>> {
        Ok(self.pending.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn usage_profile(&self, app_name: &str, _days: i64) -> Result<UsageProfile> {
        Ok(UsageProfile {
            app_name: app_name.to_string(),
            total_seconds: 7200,
            distinct_users: 3,
            active_days: 4,
            avg_session_seconds: 600.0,
            top_teams: vec!["Engineering".into()],
            sample_titles: vec![],
        })
    }

    async fn review_stats(&self, label: Productivity, _days: i64) -> Result<ReviewStats> {
        Ok(self.stats.lock().unwrap().get(&label).copied().unwrap_or_default())
    }

    async fn upsert_rule(&self, rule: &NewRule) -> Result<ClassificationRule> {
        self.write_rule(rule)
    }

    async fn insert_pending(&self, pending: &NewPending) -> Result<PendingClassification> {
        let item = PendingClassification {
            id: Uuid::new_v4(),
            app_name: pending.key.app_name.clone(),
            team_id: pending.key.team_id,
            role: pending.key.role.clone(),
            suggested_classification: pending.suggestion.classification,
            confidence: pending.suggestion.confidence,
            reasoning: Some(pending.suggestion.reasoning.clone()),
            status: ReviewStatus::Pending,
            requested_by: pending.requested_by,
            reviewed_by: None,
            final_classification: None,
            review_note: None,
            created_at: Utc::now(),
            reviewed_at: None,
        };
        self.pending.lock().unwrap().push(item.clone());
        Ok(item)
    }

    async fn complete_review(&self, decision: &ReviewDecision) -> Result<PendingClassification> {
        let mut pending = self.pending.lock().unwrap();
        let item = pending
            .iter_mut()
            .find(|p| p.id == decision.id)
            .ok_or_else(|| AppError::NotFound("pending".into()))?;
        if item.status != ReviewStatus::Pending {
            return Err(AppError::Conflict("already reviewed".into()));
        }
        item.status = decision.status;
        item.reviewed_by = Some(decision.reviewer_id);
        item.final_classification = decision.final_classification.map(|p| p.as_str().to_string());
        item.review_note = decision.note.clone();
        item.reviewed_at = Some(Utc::now());
        Ok(item.clone())
    }

    async fn approve_review(
        &self,
        decision: &ReviewDecision,
        rule: &NewRule,
        feedback: Option<&NewFeedback>,
    ) -> Result<ClassificationRule> {
        {
            let pending = self.pending.lock().unwrap();
            let item = pending
                .iter()
                .find(|p| p.id == decision.id)
                .ok_or_else(|| AppError::NotFound("pending".into()))?;
            if item.status != ReviewStatus::Pending {
                return Err(AppError::Conflict("already reviewed".into()));
            }
        }
        let saved = self.write_rule(rule)?;
        self.complete_review(decision).await?;
        if let Some(feedback) = feedback {
            self.feedback.lock().unwrap().push(feedback.clone());
        }
        Ok(saved)
    }
}
