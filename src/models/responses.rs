//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;

/// Acknowledgement used by the cache and user endpoints
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub error: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
        }
    }
}

/// Response body of `POST /api/get-from-cache`
#[derive(Debug, Clone, Serialize)]
pub struct CacheValueResponse {
    pub error: bool,
    pub message: String,
    pub value: serde_json::Value,
}

impl CacheValueResponse {
    pub fn found(value: serde_json::Value) -> Self {
        Self {
            error: false,
            message: "Success".to_string(),
            value,
        }
    }
}

/// Response body of `POST /api/tokens`
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// Plaintext token, shown only once
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// Response body of `POST /api/validate-token`
#[derive(Debug, Clone, Serialize)]
pub struct ValidTokenResponse {
    pub valid: bool,
}

/// Response body of `POST /users/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub remember: bool,
}

/// Response body of `GET /users/flash`
#[derive(Debug, Clone, Serialize)]
pub struct FlashResponse {
    pub user_id: Option<i64>,
    /// Message left by the previous request, shown once
    pub flash: Option<String>,
}

/// Response body of `POST /api/create-user`
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUserResponse {
    pub id: i64,
}

/// Response body of `GET /users/reset-password`
#[derive(Debug, Clone, Serialize)]
pub struct ResetFormResponse {
    /// Email encrypted for the hidden form field
    pub email: String,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Active cache backend, absent when caching is disabled
    pub cache: Option<&'static str>,
    /// Embedded store counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CacheStats>,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(cache: Option<&'static str>, stats: Option<CacheStats>) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            cache,
            stats,
        }
    }
}
