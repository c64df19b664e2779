mod common;

use common::{user, MemoryAudit, MemoryStore, ScriptedLlm};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use uuid::Uuid;
use workforce_analytics::classification::{
    ClassificationOutcome, ClassificationService, ClassifyRequest, ManualRuleRequest, Productivity,
    ReviewStats, ReviewStatus, RuleSource, ThresholdPolicy,
};
use workforce_analytics::observability::AgentType;
use workforce_analytics::security::Role;
use workforce_analytics::AppError;

struct Harness {
    llm: Arc<ScriptedLlm>,
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAudit>,
    service: ClassificationService,
}

fn harness(replies: &[&str]) -> Harness {
    let llm = Arc::new(ScriptedLlm::new(replies));
    let store = Arc::new(MemoryStore::default());
    let audit = Arc::new(MemoryAudit::default());
    let service = ClassificationService::new(store.clone(), llm.clone(), ThresholdPolicy::default(), audit.clone());
    Harness {
        llm,
        store,
        audit,
        service,
    }
}

fn request(app: &str) -> ClassifyRequest {
    ClassifyRequest {
        app_name: app.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_confident_suggestion_becomes_a_rule() {
    let h = harness(&[r#"{"classification": "productive", "confidence": 0.93, "reasoning": "IDE"}"#]);
    let admin = user(Role::Admin, None);

    let outcome = h.service.classify(&admin, request("  VS Code ")).await.unwrap();

    match outcome {
        ClassificationOutcome::AutoApproved { rule, threshold } => {
            assert_eq!(rule.app_name, "vs code");
            assert_eq!(rule.classification, Productivity::Productive);
            assert_eq!(rule.source, RuleSource::Llm);
            assert!((threshold - 0.80).abs() < 1e-9);
        }
        other => panic!("expected auto approval, got {other:?}"),
    }

    let again = h.service.classify(&admin, request("vs code")).await.unwrap();
    assert!(matches!(again, ClassificationOutcome::ExistingRule { .. }));
    assert_eq!(h.llm.calls(), 1);

    let entries = h.audit.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.agent_type == AgentType::Classification && e.success));
}

#[tokio::test]
async fn test_percentage_confidence_below_threshold_needs_review() {
    let h = harness(&[r#"{"classification": "unproductive", "confidence": "60%", "reasoning": "games"}"#]);
    let admin = user(Role::Admin, None);

    let outcome = h.service.classify(&admin, request("Steam")).await.unwrap();

    match outcome {
        ClassificationOutcome::PendingReview { pending, threshold } => {
            assert!((pending.confidence - 0.6).abs() < 1e-9);
            assert!((threshold - 0.80).abs() < 1e-9);
        }
        other => panic!("expected pending review, got {other:?}"),
    }
    assert!(h.store.rules.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_frequent_overrides_raise_the_bar() {
    let h = harness(&[r#"{"classification": "neutral", "confidence": 0.85, "reasoning": "chat"}"#]);
    h.store.stats.lock().unwrap().insert(
        Productivity::Neutral,
        ReviewStats {
            reviewed: 10,
            rejected: 3,
            overridden: 3,
        },
    );
    let admin = user(Role::Admin, None);

    let outcome = h.service.classify(&admin, request("Slack")).await.unwrap();

    match outcome {
        ClassificationOutcome::PendingReview { pending, threshold } => {
            assert!((threshold - 0.95).abs() < 1e-9);
            assert_eq!(pending.status, ReviewStatus::Pending);
            assert_eq!(pending.requested_by, Some(admin.user_id));
        }
        other => panic!("expected pending review, got {other:?}"),
    }
}

#[tokio::test]
async fn test_review_with_override_records_feedback() {
    let team = Uuid::new_v4();
    let h = harness(&[r#"{"classification": "unproductive", "confidence": 0.4, "reasoning": "video"}"#]);
    let manager = user(Role::Manager, Some(team));

    let pending = match h.service.classify(&manager, request("YouTube")).await.unwrap() {
        ClassificationOutcome::PendingReview { pending, .. } => pending,
        other => panic!("expected pending review, got {other:?}"),
    };
    assert_eq!(pending.team_id, Some(team));

    let repeat = h.service.classify(&manager, request("youtube")).await.unwrap();
    assert!(matches!(repeat, ClassificationOutcome::AlreadyPending { .. }));
    assert_eq!(h.llm.calls(), 1);

    let outsider = user(Role::Manager, Some(Uuid::new_v4()));
    assert!(matches!(
        h.service.approve(&outsider, pending.id, None).await,
        Err(AppError::Forbidden(_))
    ));

    let rule = h
        .service
        .approve(&manager, pending.id, Some(Productivity::Neutral))
        .await
        .unwrap();
    assert_eq!(rule.classification, Productivity::Neutral);
    assert_eq!(rule.source, RuleSource::Manual);
    assert_eq!(rule.confidence, 1.0);

    let feedback = h.store.feedback.lock().unwrap().clone();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].original, Productivity::Unproductive);
    assert_eq!(feedback[0].corrected, Productivity::Neutral);

    assert!(matches!(
        h.service.reject(&manager, pending.id, None).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_plain_approval_keeps_the_suggestion() {
    let h = harness(&[r#"{"classification": "neutral", "confidence": 0.5, "reasoning": "mail"}"#]);
    let admin = user(Role::Admin, None);

    let pending = match h.service.classify(&admin, request("Outlook")).await.unwrap() {
        ClassificationOutcome::PendingReview { pending, .. } => pending,
        other => panic!("expected pending review, got {other:?}"),
    };
    let rule = h.service.approve(&admin, pending.id, Some(Productivity::Neutral)).await.unwrap();

    assert_eq!(rule.source, RuleSource::Approved);
    assert_eq!(rule.confidence, 0.5);
    assert!(h.store.feedback.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_global_items_need_an_admin() {
    let h = harness(&[r#"{"classification": "neutral", "confidence": 0.1, "reasoning": "?"}"#]);
    let admin = user(Role::Admin, None);
    let pending = match h.service.classify(&admin, request("Notion")).await.unwrap() {
        ClassificationOutcome::PendingReview { pending, .. } => pending,
        other => panic!("expected pending review, got {other:?}"),
    };

    let manager = user(Role::Manager, Some(Uuid::new_v4()));
    assert!(matches!(
        h.service.reject(&manager, pending.id, Some("no".into())).await,
        Err(AppError::Forbidden(_))
    ));
    let rejected = h.service.reject(&admin, pending.id, Some(" duplicate ".into())).await.unwrap();
    assert_eq!(rejected.status, ReviewStatus::Rejected);
    assert_eq!(rejected.review_note.as_deref(), Some("duplicate"));
}

#[tokio::test]
async fn test_employees_cannot_classify_but_are_audited() {
    let h = harness(&[]);
    let employee = user(Role::Employee, None);

    let err = h.service.classify(&employee, request("Figma")).await.unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
    let entries = h.audit.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
}

#[tokio::test]
async fn test_manual_rule_overwrites_existing() {
    let h = harness(&[r#"{"classification": "productive", "confidence": 0.99, "reasoning": "docs"}"#]);
    let admin = user(Role::Admin, None);
    h.service.classify(&admin, request("Confluence")).await.unwrap();

    let rule = h
        .service
        .save_manual_rule(
            &admin,
            ManualRuleRequest {
                app_name: "confluence".into(),
                team_id: None,
                role: None,
                classification: Productivity::Neutral,
                reasoning: Some("mostly reading".into()),
            },
        )
        .await
        .unwrap();

    assert_eq!(rule.source, RuleSource::Manual);
    assert_eq!(h.store.rules.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_approval_leaves_the_item_pending() {
    let h = harness(&[r#"{"classification": "unproductive", "confidence": 0.3, "reasoning": "social"}"#]);
    let admin = user(Role::Admin, None);
    let pending = match h.service.classify(&admin, request("Reddit")).await.unwrap() {
        ClassificationOutcome::PendingReview { pending, .. } => pending,
        other => panic!("expected pending review, got {other:?}"),
    };

    h.store.fail_rule_writes.store(true, Ordering::SeqCst);
    let err = h
        .service
        .approve(&admin, pending.id, Some(Productivity::Neutral))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)), "got {err:?}");

    let stored = h.store.pending.lock().unwrap()[0].clone();
    assert_eq!(stored.status, ReviewStatus::Pending);
    assert!(h.store.rules.lock().unwrap().is_empty());
    assert!(h.store.feedback.lock().unwrap().is_empty());

    // The retry goes through once the store recovers.
    h.store.fail_rule_writes.store(false, Ordering::SeqCst);
    let rule = h
        .service
        .approve(&admin, pending.id, Some(Productivity::Neutral))
        .await
        .unwrap();
    assert_eq!(rule.classification, Productivity::Neutral);
    assert_eq!(h.store.feedback.lock().unwrap().len(), 1);
}
