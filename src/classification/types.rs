//! Classification domain types.

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Productivity {
    Productive,
    Neutral,
    Unproductive,
}

impl Productivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Productivity::Productive => "productive",
            Productivity::Neutral => "neutral",
            Productivity::Unproductive => "unproductive",
        }
    }
}

impl fmt::Display for Productivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Productivity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "productive" => Ok(Productivity::Productive),
            "neutral" => Ok(Productivity::Neutral),
            "unproductive" | "nonproductive" | "distracting" => Ok(Productivity::Unproductive),
            other => Err(AppError::Validation(format!("Unknown classification '{other}'"))),
        }
    }
}

impl TryFrom<String> for Productivity {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(AppError::Validation(format!("Unknown review status '{other}'"))),
        }
    }
}

impl TryFrom<String> for ReviewStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Who produced a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Llm,
    Approved,
    Manual,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSource::Llm => "llm",
            RuleSource::Approved => "approved",
            RuleSource::Manual => "manual",
        }
    }
}

impl TryFrom<String> for RuleSource {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "llm" => Ok(RuleSource::Llm),
            "approved" => Ok(RuleSource::Approved),
            "manual" => Ok(RuleSource::Manual),
            other => Err(AppError::Validation(format!("Unknown rule source '{other}'"))),
        }
    }
}

/// Identity of a rule: application plus optional team and role scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClassificationKey {
    pub app_name: String,
    pub team_id: Option<Uuid>,
    pub role: Option<String>,
}

impl ClassificationKey {
    /// Trims and lower-cases the app name; blank roles count as unscoped.
    pub fn new(app_name: &str, team_id: Option<Uuid>, role: Option<&str>) -> Result<Self> {
        let app_name = app_name.trim().to_lowercase();
        if app_name.is_empty() {
            return Err(AppError::Validation("app_name must not be empty".to_string()));
        }
        if app_name.chars().count() > 200 {
            return Err(AppError::Validation("app_name is too long".to_string()));
        }
        let role = role
            .map(|r| r.trim().to_lowercase())
            .filter(|r| !r.is_empty());
        Ok(Self { app_name, team_id, role })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ClassificationRule {
    pub id: Uuid,
    pub app_name: String,
    pub team_id: Option<Uuid>,
    pub role: Option<String>,
    #[sqlx(try_from = "String")]
    pub classification: Productivity,
    pub confidence: f64,
    pub reasoning: Option<String>,
    #[sqlx(try_from = "String")]
    pub source: RuleSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PendingClassification {
    pub id: Uuid,
    pub app_name: String,
    pub team_id: Option<Uuid>,
    pub role: Option<String>,
    #[sqlx(try_from = "String")]
    pub suggested_classification: Productivity,
    pub confidence: f64,
    pub reasoning: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ReviewStatus,
    pub requested_by: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    /// Label chosen by the reviewer on approval.
    pub final_classification: Option<String>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ClassificationFeedback {
    pub id: Uuid,
    pub pending_id: Uuid,
    pub app_name: String,
    pub team_id: Option<Uuid>,
    pub original_classification: String,
    pub corrected_classification: String,
    pub reviewer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// What the LLM said about an application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub classification: Productivity,
    pub confidence: f64,
    pub reasoning: String,
}

/// Recent usage of an application, shown to the LLM as context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageProfile {
    pub app_name: String,
    pub total_seconds: i64,
    pub distinct_users: i64,
    pub active_days: i64,
    pub avg_session_seconds: f64,
    pub top_teams: Vec<String>,
    pub sample_titles: Vec<String>,
}

/// Review counts for one suggested label over the review window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewStats {
    pub reviewed: i64,
    pub rejected: i64,
    pub overridden: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub key: ClassificationKey,
    pub classification: Productivity,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub source: RuleSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPending {
    pub key: ClassificationKey,
    pub suggestion: Suggestion,
    pub requested_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    pub id: Uuid,
    pub status: ReviewStatus,
    pub reviewer_id: Uuid,
    pub final_classification: Option<Productivity>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub pending_id: Uuid,
    pub app_name: String,
    pub team_id: Option<Uuid>,
    pub original: Productivity,
    pub corrected: Productivity,
    pub reviewer_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyRequest {
    pub app_name: String,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub role: Option<String>,
    /// Re-classify even when a rule already exists.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClassificationOutcome {
    ExistingRule { rule: ClassificationRule },
    AlreadyPending { pending: PendingClassification },
    AutoApproved { rule: ClassificationRule, threshold: f64 },
    PendingReview { pending: PendingClassification, threshold: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_productivity_parsing() {
        assert_eq!("Productive".parse::<Productivity>().unwrap(), Productivity::Productive);
        assert_eq!("non-productive".parse::<Productivity>().unwrap(), Productivity::Unproductive);
        assert!("great".parse::<Productivity>().is_err());
    }

    #[test]
    fn test_key_normalisation() {
        let key = ClassificationKey::new("  Slack ", None, Some("  ")).unwrap();
        assert_eq!(key.app_name, "slack");
        assert_eq!(key.role, None);
        assert!(ClassificationKey::new("   ", None, None).is_err());
    }
}
