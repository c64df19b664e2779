pub mod agent;
pub mod api;
pub mod classification;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod fuzzy_matcher;
pub mod llm;
pub mod observability;
pub mod schema;
pub mod security;

pub use config::Config;
pub use error::{AppError, Result};
