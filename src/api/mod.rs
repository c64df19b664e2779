//! HTTP surface: shared state, router and handlers.

pub mod audit;
pub mod chat;
pub mod classification;
pub mod health;
pub mod middleware;
pub mod projects;
pub mod teams;
pub mod usage;
pub mod users;

use crate::agent::ChatAgent;
use crate::classification::{ClassificationService, ThresholdPolicy};
use crate::config::Config;
use crate::db::{
    AuditRepository, PgClassificationStore, ProjectRepository, TeamRepository, UsageRepository,
    UserRepository,
};
use crate::execution::{ExecutionContext, PgBackend};
use crate::llm::CompletionProvider;
use crate::security::{TokenVerifier, UserDirectory};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared between handlers.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub verifier: TokenVerifier,
    pub directory: Arc<dyn UserDirectory>,
    pub llm_configured: bool,
    pub chat: ChatAgent,
    pub classification: ClassificationService,
    pub rules: PgClassificationStore,
    pub users: UserRepository,
    pub teams: TeamRepository,
    pub usage: UsageRepository,
    pub projects: ProjectRepository,
    pub audit: AuditRepository,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool, llm: Arc<dyn CompletionProvider>) -> Self {
        let users = UserRepository::new(pool.clone());
        let teams = TeamRepository::new(pool.clone());
        let audit = AuditRepository::new(pool.clone());
        let rules = PgClassificationStore::new(pool.clone());
        let exec = ExecutionContext {
            timeout: config.query_timeout,
            max_rows: config.max_result_rows,
        };

        let chat = ChatAgent::new(
            llm.clone(),
            Arc::new(PgBackend::new(pool.clone())),
            Arc::new(teams.clone()),
            Arc::new(audit.clone()),
            exec,
        );
        let classification = ClassificationService::new(
            Arc::new(rules.clone()),
            llm,
            ThresholdPolicy::new(config.classification_base_threshold),
            Arc::new(audit.clone()),
        );

        Self {
            verifier: TokenVerifier::new(&config.jwt_secret),
            directory: Arc::new(users.clone()),
            llm_configured: config.llm_api_key.is_some(),
            chat,
            classification,
            rules,
            users,
            teams,
            usage: UsageRepository::new(pool.clone()),
            projects: ProjectRepository::new(pool.clone()),
            audit,
            pool,
            config,
        }
    }

    /// Replaces the account lookup used by the auth gate.
    pub fn with_user_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/me", get(users::me))
        .route("/chat", post(chat::ask))
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/:id",
            get(users::get_one).put(users::update).delete(users::deactivate),
        )
        .route("/teams", get(teams::list).post(teams::create))
        .route(
            "/teams/:id",
            get(teams::get_one).put(teams::update).delete(teams::remove),
        )
        .route("/usage/daily", get(usage::daily))
        .route("/usage/apps", get(usage::apps))
        .route("/usage/summary", get(usage::summary))
        .route("/projects", get(projects::list).post(projects::create))
        .route(
            "/projects/:id",
            get(projects::get_one).put(projects::update).delete(projects::remove),
        )
        .route(
            "/projects/:id/entries",
            get(projects::list_entries).post(projects::create_entry),
        )
        .route("/classification/analyze", get(classification::analyze))
        .route("/classification/classify", post(classification::classify))
        .route("/classification/pending", get(classification::list_pending))
        .route("/classification/pending/:id/approve", post(classification::approve))
        .route("/classification/pending/:id/reject", post(classification::reject))
        .route(
            "/classification/rules",
            get(classification::list_rules).post(classification::create_rule),
        )
        .route(
            "/classification/rules/:id",
            get(classification::get_rule)
                .put(classification::update_rule)
                .delete(classification::delete_rule),
        )
        .route("/classification/feedback", get(classification::list_feedback))
        .route("/audit", get(audit::list))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let api = Router::new()
        .route("/health", get(health::health))
        .merge(protected);

    let mut app = Router::new().nest("/api", api);
    if let Some(dir) = &state.config.static_dir {
        let spa = ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html")));
        app = app.fallback_service(spa);
    }

    app.layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
