mod common;

use chrono::NaiveDate;
use common::{user, FakeBackend, MemoryAudit, ScriptedLlm, StaticTeams};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use workforce_analytics::agent::{ChatAgent, SqlSource, TeamRef};
use workforce_analytics::execution::{ExecutionContext, SqlParam};
use workforce_analytics::security::Role;
use workforce_analytics::AppError;

struct Harness {
    llm: Arc<ScriptedLlm>,
    backend: Arc<FakeBackend>,
    audit: Arc<MemoryAudit>,
    agent: ChatAgent,
}

fn harness(replies: &[&str], rows: serde_json::Value, teams: Vec<TeamRef>) -> Harness {
    let llm = Arc::new(ScriptedLlm::new(replies));
    let backend = Arc::new(FakeBackend::returning(rows));
    let audit = Arc::new(MemoryAudit::default());
    let agent = ChatAgent::new(
        llm.clone(),
        backend.clone(),
        Arc::new(StaticTeams(teams)),
        audit.clone(),
        ExecutionContext::default(),
    );
    Harness {
        llm,
        backend,
        audit,
        agent,
    }
}

fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
}

#[tokio::test]
async fn test_list_request_skips_the_llm() {
    let team = Uuid::new_v4();
    let manager = user(Role::Manager, Some(team));
    let h = harness(
        &[],
        json!([
            {"name": "Ana", "email": "ana@example.com"},
            {"name": "Bo", "email": "bo@example.com"}
        ]),
        vec![],
    );

    let response = h.agent.ask_on(&manager, "list all users", wednesday()).await.unwrap();

    assert_eq!(h.llm.calls(), 0);
    assert_eq!(response.sql_source, SqlSource::Template);
    assert_eq!(response.row_count, 2);
    assert!(response.answer.starts_with("Found 2 users:"));

    let executed = h.backend.executed.lock().unwrap();
    assert!(executed[0].0.contains("u.team_id = $1"));
    assert_eq!(executed[0].1, vec![SqlParam::Uuid(team)]);

    let entries = h.audit.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].success);
    assert_eq!(entries[0].id, response.audit_id);
    assert_eq!(entries[0].generated_sql.as_deref(), Some(response.sql.as_str()));
}

#[tokio::test]
async fn test_llm_sql_is_scoped_to_the_employee() {
    let employee = user(Role::Employee, None);
    let h = harness(
        &[
            r#"{"intent": "aggregate", "entity": "usage", "metrics": ["active_seconds"], "filters": [], "date_phrase": "last week"}"#,
            "```sql\nSELECT SUM(active_seconds) AS total_active_seconds FROM daily_usage WHERE date BETWEEN '2024-05-06' AND '2024-05-12'\n```",
        ],
        json!([{"total_active_seconds": 45000}]),
        vec![],
    );

    let response = h
        .agent
        .ask_on(&employee, "How many hours did I work last week?", wednesday())
        .await
        .unwrap();

    assert_eq!(h.llm.calls(), 2);
    assert_eq!(response.sql_source, SqlSource::Llm);
    assert!(response.answer.contains("12.5 hours"), "answer was {}", response.answer);
    assert_eq!(response.tables, vec!["daily_usage".to_string()]);

    let executed = h.backend.executed.lock().unwrap();
    let (sql, params) = &executed[0];
    assert!(sql.starts_with("WITH daily_usage AS (SELECT * FROM daily_usage s WHERE s.user_id = $1)"));
    assert_eq!(params, &vec![SqlParam::Uuid(employee.user_id)]);
}

#[tokio::test]
async fn test_unsafe_llm_sql_is_refused_and_audited() {
    let admin = user(Role::Admin, None);
    let h = harness(
        &[
            r#"{"intent": "aggregate", "entity": "users", "metrics": [], "filters": []}"#,
            "DELETE FROM users",
        ],
        json!([]),
        vec![],
    );

    let err = h
        .agent
        .ask_on(&admin, "How many people have we got on staff?", wednesday())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::UnsafeSql(_)), "got {err:?}");
    assert!(h.backend.executed.lock().unwrap().is_empty());
    let entries = h.audit.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].success);
    assert!(entries[0].error_message.is_some());
}

#[tokio::test]
async fn test_empty_message_is_rejected_before_any_work() {
    let admin = user(Role::Admin, None);
    let h = harness(&[], json!([]), vec![]);

    let err = h.agent.ask_on(&admin, "   ", wednesday()).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(h.llm.calls(), 0);
    assert_eq!(h.audit.entries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_team_name_in_question_narrows_the_list() {
    let admin = user(Role::Admin, None);
    let sales = TeamRef {
        id: Uuid::new_v4(),
        name: "Sales".into(),
    };
    let h = harness(&[], json!([]), vec![sales.clone()]);

    let response = h
        .agent
        .ask_on(&admin, "show projects for the sales team", wednesday())
        .await
        .unwrap();

    assert_eq!(response.intent.team.as_ref().map(|t| t.id), Some(sales.id));
    assert!(response.answer.starts_with("No matching data"));
    let executed = h.backend.executed.lock().unwrap();
    assert!(executed[0].1.contains(&SqlParam::Uuid(sales.id)));
}

#[tokio::test]
async fn test_words_resembling_a_team_do_not_narrow_analytics() {
    let admin = user(Role::Admin, None);
    let product = TeamRef {
        id: Uuid::new_v4(),
        name: "Product".into(),
    };
    let h = harness(
        &[
            r#"{"intent": "aggregate", "entity": "usage", "metrics": ["productive_seconds"], "filters": []}"#,
            "SELECT t.name, SUM(du.productive_seconds) AS productive_seconds FROM daily_usage du \
             JOIN users u ON u.id = du.user_id JOIN teams t ON t.id = u.team_id GROUP BY t.name",
        ],
        json!([]),
        vec![product],
    );

    let response = h
        .agent
        .ask_on(&admin, "Compare productivity across all teams", wednesday())
        .await
        .unwrap();

    assert!(response.intent.team.is_none());
    assert!(response.intent.unmatched_team.is_none());
    let executed = h.backend.executed.lock().unwrap();
    assert!(executed[0].1.is_empty(), "params were {:?}", executed[0].1);
}
