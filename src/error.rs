//! Error types for sandq.

use thiserror::Error;

use crate::model::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store initialization failed: {0}")]
    StoreInit(String),

    /// Lock contention, pool exhaustion or a serialization failure. Retryable.
    #[error("store busy: {0}")]
    Busy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(sqlx::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller may retry the same operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Busy(_))
    }
}

// SQLITE_BUSY, SQLITE_LOCKED and their extended codes.
const SQLITE_BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517", "518", "773"];
// serialization_failure, deadlock_detected, lock_not_available.
const POSTGRES_BUSY_CODES: &[&str] = &["40001", "40P01", "55P03"];

fn is_busy_code(code: &str) -> bool {
    SQLITE_BUSY_CODES.contains(&code) || POSTGRES_BUSY_CODES.contains(&code)
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Error::Busy("timed out acquiring a connection".into()),
            sqlx::Error::Database(ref db) => {
                let busy = db.code().is_some_and(|code| is_busy_code(&code));
                if busy {
                    Error::Busy(db.message().to_string())
                } else if db.is_unique_violation() {
                    Error::Conflict(db.message().to_string())
                } else {
                    Error::Storage(err)
                }
            }
            other => Error::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
