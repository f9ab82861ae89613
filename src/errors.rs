use crate::{
    models::{folder::ConfigurationError, static_file::ConsistencyError, static_file::FileType},
    services::{object_store::ObjectStoreError, upload::PolicyError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;
use uuid::Uuid;

/// Every failure the static file service can report.
///
/// Validation and policy errors are detected before any I/O and block the
/// operation. Object-store failures are propagated unchanged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Transport(#[from] ObjectStoreError),
    #[error("folder `{0}` not found")]
    FolderNotFound(String),
    #[error("file `{0}` not found")]
    FileNotFound(String),
    #[error("content of `{0}` not found on disk")]
    ContentNotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{operation} is not supported for {file_type:?} files")]
    Unsupported {
        operation: &'static str,
        file_type: FileType,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServiceError {
    pub fn folder_not_found(id: Uuid) -> Self {
        Self::FolderNotFound(id.to_string())
    }

    pub fn file_not_found(id: Uuid) -> Self {
        Self::FileNotFound(id.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Configuration(_)
            | ServiceError::Consistency(_)
            | ServiceError::Policy(_)
            | ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::FolderNotFound(_)
            | ServiceError::FileNotFound(_)
            | ServiceError::ContentNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::Unsupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::Transport(ObjectStoreError::InvalidObjectKey(_)) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Transport(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Sqlx(_) | ServiceError::Io(_) => {
                tracing::error!(error = %err, "internal error");
                return AppError::internal("internal error");
            }
        };
        AppError::new(status, err.to_string())
    }
}
