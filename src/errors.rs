//! # Error Handling
//!
//! Every failure the query engine can produce is an [`ApiError`]. The variants
//! map onto HTTP status codes and render as sanitized JSON bodies, so a handler
//! can return `Result<QueryOutput, ApiError>` directly.
//!
//! Storage-layer failures are classified at the backend boundary:
//!
//! - [`DbErr`] (relational backend): unique violations become `409 Conflict`,
//!   not-null violations and failed statements become `400 Bad Request`,
//!   missing records become `404 Not Found`, everything else is a logged
//!   `500`.
//! - [`DocumentError`] (document backend): duplicate keys become `409`,
//!   invalid queries and ambiguous single-record lookups become `400`,
//!   missing documents become `404`.
//!
//! Internal details are logged with `tracing` and never sent to clients.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use std::fmt;

use crate::backend::document::{DUPLICATE_KEY_CODE, DocumentError};

/// Backend-agnostic error categories the web layer renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

/// API error type with automatic logging and sanitized responses
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - malformed or conflicting parameters
    BadRequest {
        /// User-facing error message
        message: String,
    },

    /// 400 Bad Request - the plan needs a capability the backend lacks
    Unsupported {
        /// Backend name (e.g. "relational")
        backend: &'static str,
        /// The directive that cannot be honoured (e.g. "_group")
        operation: String,
    },

    /// 404 Not Found - a single-record fetch matched nothing
    NotFound {
        /// Resource type (e.g. "Task")
        resource: String,
        /// Optional description of the lookup that failed
        detail: Option<String>,
    },

    /// 409 Conflict - uniqueness violation surfaced by the storage layer
    Conflict {
        /// User-facing error message
        message: String,
    },

    /// 500 Internal Server Error - relational driver error (details logged, not exposed)
    Database {
        /// User-facing generic message
        message: String,
        /// Internal error (logged, not sent to user)
        internal: DbErr,
    },

    /// 500 Internal Server Error - generic internal error
    Internal {
        /// User-facing generic message
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },
}

impl ApiError {
    // ============================================================================
    // Constructors
    // ============================================================================

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create an "unsupported on this backend" error
    pub fn unsupported(backend: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend,
            operation: operation.into(),
        }
    }

    /// Create a 404 Not Found error
    pub fn not_found(resource: impl Into<String>, detail: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            detail,
        }
    }

    /// Create a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a 500 error from a relational driver error without classifying it
    pub fn database(err: DbErr) -> Self {
        Self::Database {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    /// Create a 500 Internal Server Error with optional details
    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    // ============================================================================
    // Accessors
    // ============================================================================

    /// The backend-agnostic category of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } | Self::Unsupported { .. } => ErrorKind::BadRequest,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Database { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the user-facing error message (sanitized)
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { resource, detail } => match detail {
                Some(detail) => format!("'{resource}({detail})' resource not found"),
                None => format!("{resource} not found"),
            },
            Self::Unsupported { backend, operation } => {
                format!("`{operation}` is not supported on the {backend} backend")
            }
            Self::BadRequest { message }
            | Self::Conflict { message }
            | Self::Database { message, .. }
            | Self::Internal { message, .. } => message.clone(),
        }
    }

    /// Log internal error details (not sent to user)
    fn log_internal(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "API error"
                );
            }
        }
    }
}

/// Error response sent to users (sanitized)
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.user_message(),
        };

        (status, Json(body)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// Storage error classification
// ============================================================================

/// Extract the column from a constraint message such as
/// `UNIQUE constraint failed: tasks.title`.
fn failed_param(message: &str) -> &str {
    let (_, failed) = message.rsplit_once(':').unwrap_or(("", message));
    let (_, param) = failed.split_once('.').unwrap_or(("", failed));
    param.trim()
}

/// Convert Sea-ORM `DbErr` to `ApiError`
///
/// - `RecordNotFound` → 404
/// - unique constraint violation → 409 `Must be unique '<column>'`
/// - not-null constraint violation → 400 `Missing '<column>'`
/// - failed statement (`Exec`/`Query`) → 400 `Unknown`, driver detail logged
/// - anything else → 500, driver detail logged
impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        if let DbErr::RecordNotFound(msg) = &err {
            let resource = msg.split_whitespace().next().unwrap_or("Resource");
            return Self::not_found(resource, None);
        }

        if let Some(SqlErr::UniqueConstraintViolation(msg)) = err.sql_err() {
            return Self::conflict(format!("Must be unique '{}'", failed_param(&msg)));
        }

        let text = err.to_string();
        let lowered = text.to_lowercase();
        if lowered.contains("not null") || lowered.contains("not-null") {
            return Self::bad_request(format!("Missing '{}'", failed_param(&text)));
        }

        if matches!(err, DbErr::Exec(_) | DbErr::Query(_)) {
            tracing::error!(error = ?err, "Relational query failed");
            return Self::bad_request("Unknown");
        }

        Self::database(err)
    }
}

/// Convert a document driver error to `ApiError`
impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NotUnique(msg) if msg.contains(DUPLICATE_KEY_CODE) => {
                tracing::debug!(error = %msg, "Duplicate key");
                Self::conflict("Resource already exists.")
            }
            DocumentError::NotUnique(_) => Self::bad_request("Not Unique"),
            DocumentError::Operation(msg)
            | DocumentError::Validation(msg)
            | DocumentError::InvalidQuery(msg)
            | DocumentError::OperationFailure(msg) => Self::bad_request(msg),
            DocumentError::MultipleObjectsReturned => {
                Self::bad_request("Bad or Insufficient Params")
            }
            DocumentError::DoesNotExist(resource) => Self::not_found(resource, None),
        }
    }
}
