mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use common::{user, ScriptedLlm, StaticUsers};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use workforce_analytics::api::{create_router, AppState};
use workforce_analytics::db::lazy_pool;
use workforce_analytics::security::{issue_token, Role, UserContext};
use workforce_analytics::Config;

const SECRET: &str = "router-test-secret-0123456789";

fn config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://wa:wa@127.0.0.1:5432/wa"),
        ("JWT_SECRET", SECRET),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

fn app(users: &[&UserContext]) -> Router {
    let config = config();
    let pool = lazy_pool(&config.database_url).unwrap();
    let directory = StaticUsers(users.iter().map(|u| (u.user_id, (*u).clone())).collect());
    let state = AppState::new(config, pool, Arc::new(ScriptedLlm::default())).with_user_directory(Arc::new(directory));
    create_router(Arc::new(state))
}

fn token_for(user_id: Uuid) -> String {
    issue_token(SECRET, user_id, None, Duration::hours(1)).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app(&[]).oneshot(get("/api/me", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Authorization"));
}

#[tokio::test]
async fn test_unknown_or_forged_token_is_unauthorized() {
    let known = user(Role::Employee, None);
    let router = app(&[&known]);

    let stranger = token_for(Uuid::new_v4());
    let response = router.clone().oneshot(get("/api/me", Some(&stranger))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = issue_token("some-other-secret-987654321", known.user_id, None, Duration::hours(1)).unwrap();
    let response = router.oneshot(get("/api/me", Some(&forged))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_the_caller() {
    let team = Uuid::new_v4();
    let manager = user(Role::Manager, Some(team));
    let response = app(&[&manager])
        .oneshot(get("/api/me", Some(&token_for(manager.user_id))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["role"], "manager");
    assert_eq!(body["team_id"], json!(team));
}

#[tokio::test]
async fn test_admin_only_routes_are_forbidden_for_others() {
    let employee = user(Role::Employee, None);
    let manager = user(Role::Manager, Some(Uuid::new_v4()));
    let router = app(&[&employee, &manager]);

    let create_user = post_json(
        "/api/users",
        &token_for(employee.user_id),
        json!({"email": "new@example.com", "name": "New", "role": "employee"}),
    );
    let response = router.clone().oneshot(create_user).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(get("/api/audit", Some(&token_for(manager.user_id))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let other_team_project = post_json(
        "/api/projects",
        &token_for(manager.user_id),
        json!({"name": "Apollo", "team_id": Uuid::new_v4()}),
    );
    let response = router.oneshot(other_team_project).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_input_is_a_bad_request() {
    let admin = user(Role::Admin, None);
    let router = app(&[&admin]);
    let token = token_for(admin.user_id);

    let response = router
        .clone()
        .oneshot(get("/api/usage/daily?start=2024-05-10&end=2024-05-01", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("after"));

    let bad_email = post_json(
        "/api/users",
        &token,
        json!({"email": "not-an-email", "name": "X", "role": "employee"}),
    );
    let response = router.oneshot(bad_email).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_employees_cannot_review() {
    let employee = user(Role::Employee, Some(Uuid::new_v4()));
    let response = app(&[&employee])
        .oneshot(get("/api/classification/pending", Some(&token_for(employee.user_id))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_malformed_review_body_is_a_bad_request() {
    let admin = user(Role::Admin, None);
    let router = app(&[&admin]);
    let token = token_for(admin.user_id);
    let id = Uuid::new_v4();

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/classification/pending/{id}/approve"),
            &token,
            json!({"classification": "prodctive"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid request body"));

    let response = router
        .oneshot(post_json(
            &format!("/api/classification/pending/{id}/reject"),
            &token,
            json!({"reason": 42}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
