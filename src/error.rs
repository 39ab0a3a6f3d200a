use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("{0}")]
    NotFound(String),

    /// Overlap or cross-school mismatch. `details` names what collided.
    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;

impl ScheduleError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::InvalidInput(_) => "bad_params",
            Self::Db(_) => "db_query_failed",
            Self::Json(_) => "json_failed",
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Conflict { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Maps a unique/foreign-key violation on a write to `Conflict`.
    pub fn from_write(e: rusqlite::Error, message: impl Into<String>, details: Value) -> Self {
        if is_constraint_violation(&e) {
            Self::conflict(message, details)
        } else {
            Self::Db(e)
        }
    }
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
