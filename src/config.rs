//! Runtime configuration loaded from the environment (and `.env` when present).

use crate::error::{AppError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub bind_addr: String,
    pub static_dir: Option<PathBuf>,
    pub cors_origins: Vec<String>,
    pub query_timeout: Duration,
    pub max_result_rows: usize,
    pub classification_base_threshold: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. `from_env` is the
    /// production entry point; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?;
        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| AppError::Config("JWT_SECRET is not set".to_string()))?;
        if jwt_secret.len() < 16 {
            return Err(AppError::Config(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }

        let query_timeout_secs = parse_or(get("QUERY_TIMEOUT_SECS"), 10u64, "QUERY_TIMEOUT_SECS")?;
        let max_result_rows = parse_or(get("MAX_RESULT_ROWS"), 1000usize, "MAX_RESULT_ROWS")?;
        let classification_base_threshold = parse_or(
            get("CLASSIFICATION_BASE_THRESHOLD"),
            0.8f64,
            "CLASSIFICATION_BASE_THRESHOLD",
        )?;
        if !(0.0..=1.0).contains(&classification_base_threshold) {
            return Err(AppError::Config(format!(
                "CLASSIFICATION_BASE_THRESHOLD must be within [0, 1], got {}",
                classification_base_threshold
            )));
        }

        Ok(Self {
            database_url,
            jwt_secret,
            llm_api_key: get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            llm_base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            static_dir: get("STATIC_DIR").map(PathBuf::from),
            cors_origins: get("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            query_timeout: Duration::from_secs(query_timeout_secs.max(1)),
            max_result_rows: max_result_rows.clamp(1, 10_000),
            classification_base_threshold,
        })
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T, key: &str) -> Result<T> {
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, v))),
        None => Ok(default),
    }
}
