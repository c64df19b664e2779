use crate::api::AppState;
use crate::classification::{
    ClassificationFeedback, ClassificationOutcome, ClassificationRule, ClassifyRequest, ManualRuleRequest,
    PendingClassification, Productivity, UsageProfile,
};
use crate::db::classification::{PendingFilter, RuleFilter};
use crate::error::{AppError, Result};
use crate::security::{AccessScope, UserContext};
use axum::extract::{Path, Query, State};
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub app_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    /// Label to use instead of the suggestion.
    #[serde(default)]
    pub classification: Option<Productivity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleUpdate {
    pub classification: Productivity,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackQuery {
    pub limit: Option<u32>,
}

/// An empty body means the defaults; anything else must parse.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))
}

/// Global rules are admin-only; team rules belong to that team's managers.
fn require_rule_owner(user: &UserContext, rule: &ClassificationRule) -> Result<()> {
    match rule.team_id {
        None => user.require_admin(),
        Some(team) if user.can_manage_team(Some(team)) => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "managers can only change their own team's rules".to_string(),
        )),
    }
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<UsageProfile>> {
    user.require_reviewer()?;
    Ok(Json(state.classification.analyze_usage(&query.app_name).await?))
}

pub async fn classify(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassificationOutcome>> {
    Ok(Json(state.classification.classify(&user, request).await?))
}

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(filter): Query<PendingFilter>,
) -> Result<Json<Vec<PendingClassification>>> {
    user.require_reviewer()?;
    let items = state
        .rules
        .list_pending(&AccessScope::for_user(&user), &filter)
        .await?;
    Ok(Json(items))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ClassificationRule>> {
    let request: ApproveRequest = optional_body(&body)?;
    Ok(Json(state.classification.approve(&user, id, request.classification).await?))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<PendingClassification>> {
    let request: RejectRequest = optional_body(&body)?;
    Ok(Json(state.classification.reject(&user, id, request.reason).await?))
}

pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RuleFilter>,
) -> Result<Json<Vec<ClassificationRule>>> {
    Ok(Json(state.rules.list_rules(&filter).await?))
}

pub async fn get_rule(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<Json<ClassificationRule>> {
    Ok(Json(state.rules.get_rule(id).await?))
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Json(request): Json<ManualRuleRequest>,
) -> Result<(StatusCode, Json<ClassificationRule>)> {
    let rule = state.classification.save_manual_rule(&user, request).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
    Json(update): Json<RuleUpdate>,
) -> Result<Json<ClassificationRule>> {
    let current = state.rules.get_rule(id).await?;
    require_rule_owner(&user, &current)?;
    let rule = state
        .classification
        .save_manual_rule(
            &user,
            ManualRuleRequest {
                app_name: current.app_name,
                team_id: current.team_id,
                role: current.role,
                classification: update.classification,
                reasoning: update.reasoning,
            },
        )
        .await?;
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let current = state.rules.get_rule(id).await?;
    require_rule_owner(&user, &current)?;
    state.rules.delete_rule(id).await?;
    info!(rule_id = %id, app = %current.app_name, "classification rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Reviewer corrections. Admin only.
pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserContext>,
    Query(query): Query<FeedbackQuery>,
) -> Result<Json<Vec<ClassificationFeedback>>> {
    user.require_admin()?;
    Ok(Json(state.rules.list_feedback(query.limit).await?))
}
