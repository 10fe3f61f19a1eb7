//! Error types for the cache engine, credential lifecycle and HTTP surface
//!
//! Provides unified error handling using thiserror.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by cache backends.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache (HTTP surface only, backends return `None`)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Networked backend could not be reached or rejected the command
    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Stored bytes could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Embedded store compaction failed
    #[error("Storage compaction error: {0}")]
    StorageCompaction(String),

    /// Embedded store I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LMDB rejected an operation (map full, reader limit, corruption)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<heed::Error> for CacheError {
    fn from(err: heed::Error) -> Self {
        match err {
            heed::Error::Io(io) => CacheError::Io(io),
            other => CacheError::Storage(other.to_string()),
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

// == Auth Error Enum ==
/// Errors raised while issuing or validating credentials.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("No Authorization header found")]
    MissingOrMalformedCredential,

    #[error("Invalid token")]
    InvalidTokenFormat,

    #[error("No matching token found")]
    TokenNotFound,

    #[error("Token has expired")]
    TokenExpired,

    #[error("No matching user found")]
    UserNotFound,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid signed url")]
    SignatureInvalid,

    #[error("Link expired")]
    LinkExpired,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Password hashing error: {0}")]
    Password(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// == Mail Error Enum ==
/// Errors raised by the mail dispatcher.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail worker is not running")]
    WorkerClosed,

    #[error("Mail dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Mail transport error: {0}")]
    Transport(String),
}

// == Scheduler Error Enum ==
/// Errors raised while registering scheduled jobs.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid schedule '{expression}' for job '{job}': {reason}")]
    InvalidSchedule {
        job: String,
        expression: String,
        reason: String,
    },

    #[error("Job '{0}' is already registered")]
    DuplicateJob(String),
}

// == App Error Enum ==
/// Error type returned by HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Field name to message, for every field that failed validation
    #[error("Validation failed")]
    Validation(BTreeMap<String, String>),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_)
            | CacheError::StorageCompaction(_)
            | CacheError::Io(_)
            | CacheError::Storage(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        error_body(status, self.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Encryption(_) | AuthError::Password(_) | AuthError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        };

        error_body(status, self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Cache(err) => err.into_response(),
            AppError::Auth(err) => err.into_response(),
            AppError::Mail(err) => error_body(StatusCode::BAD_GATEWAY, err.to_string()),
            AppError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(what) => {
                error_body(StatusCode::NOT_FOUND, format!("{} not found", what))
            }
            AppError::Validation(fields) => {
                let body = Json(json!({
                    "error": "Validation failed",
                    "fields": fields,
                }));
                (StatusCode::UNPROCESSABLE_ENTITY, body).into_response()
            }
        }
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    if status.is_server_error() {
        tracing::warn!(status = %status, error = %message, "request failed");
    }

    let body = Json(json!({
        "error": message
    }));

    (status, body).into_response()
}

// == Result Type Aliases ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Result type for HTTP handlers.
pub type ApiResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_map_to_unauthorized() {
        let response = AuthError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::SignatureInvalid.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_cache_backend_errors_map_to_service_unavailable() {
        let response = CacheError::BackendUnavailable("down".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_app_error_delegates_status() {
        let response = AppError::from(CacheError::NotFound("k".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::BadRequest("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::NotFound("User 9".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error_is_unprocessable() {
        let fields = BTreeMap::from([("email".to_string(), "Invalid email address".to_string())]);
        let response = AppError::Validation(fields).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
