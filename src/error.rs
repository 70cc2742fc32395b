use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::{ReviewState, Role};

/// Failures of the persisted key/value space.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure to turn legacy base64 `content` into a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("content is empty")]
    Empty,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Everything a workflow operation can be rejected with. None of these leave
/// the store modified.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Select a submission first")]
    SelectionRequired,

    #[error("Submission not found: {0}")]
    NotFound(String),

    #[error("Invalid file type: {0} is not a PDF")]
    InvalidFileType(String),

    #[error("File size must be under {limit_mb}MB. Current file size: {size_mb:.2}MB")]
    FileTooLarge { size_mb: f64, limit_mb: u64 },

    #[error("A {role} cannot {action}")]
    Forbidden { role: Role, action: &'static str },

    #[error("Cannot {action} a submission that is {state}")]
    InvalidTransition {
        action: &'static str,
        state: ReviewState,
    },

    #[error("{filename} changed since version {expected} (now {actual})")]
    StaleVersion {
        filename: String,
        expected: i64,
        actual: i64,
    },

    #[error("Missing or invalid actor: {0}")]
    Unauthenticated(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl WorkflowError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            WorkflowError::SelectionRequired => (StatusCode::BAD_REQUEST, "SELECTION_REQUIRED"),
            WorkflowError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            WorkflowError::InvalidFileType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "INVALID_FILE_TYPE")
            }
            WorkflowError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            WorkflowError::Forbidden { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            WorkflowError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            WorkflowError::StaleVersion { .. } => (StatusCode::CONFLICT, "STALE_VERSION"),
            WorkflowError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            WorkflowError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            WorkflowError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_message_reports_megabytes() {
        let err = WorkflowError::FileTooLarge {
            size_mb: 11.0,
            limit_mb: 10,
        };
        assert_eq!(
            err.to_string(),
            "File size must be under 10MB. Current file size: 11.00MB"
        );
        assert_eq!(err.status().0, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn store_errors_are_server_errors() {
        let err = WorkflowError::from(StoreError::Io(std::io::Error::other("disk")));
        assert!(err.status().0.is_server_error());
    }
}
