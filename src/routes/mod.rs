pub mod documents;
pub mod health;
pub mod members;
pub mod organizations;
pub mod users;
pub mod wikis;

use crate::errors::AppError;

/// Map a unique-index violation to a conflict, anything else to a database error.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(message),
        _ => AppError::Database(err),
    }
}
