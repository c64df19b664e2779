//! PostgreSQL repositories for the REST resources, the classification
//! store and the audit log.

pub mod audit;
pub mod classification;
pub mod connection;
pub mod projects;
pub mod teams;
pub mod usage;
pub mod users;

pub use audit::AuditRepository;
pub use classification::PgClassificationStore;
pub use connection::{init_pool, lazy_pool, ping, DbPool};
pub use projects::ProjectRepository;
pub use teams::TeamRepository;
pub use usage::UsageRepository;
pub use users::UserRepository;

use crate::error::AppError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Maps constraint violations to client errors; everything else stays a
/// database error.
pub(crate) fn constraint_error(err: sqlx::Error, what: &str) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return AppError::Conflict(format!("{what} already exists")),
            Some(FOREIGN_KEY_VIOLATION) => {
                return AppError::Conflict(format!("{what} is referenced by other records or references a missing record"))
            }
            _ => {}
        }
    }
    AppError::Database(err)
}

/// Clamps a requested page size to `1..=max`, defaulting to `default`.
pub(crate) fn page_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max)
}
