//! API Handlers
//!
//! JSON endpoints: health, the cache demo API and bearer tokens.

use axum::{extract::State, Json};
use tracing::debug;

use crate::api::middleware::BearerUser;
use crate::api::AppState;
use crate::auth::User;
use crate::cache::CacheValue;
use crate::error::{ApiResult, AppError, AuthError, CacheError};
use crate::models::{
    CacheKeyRequest, CacheValueResponse, HealthResponse, MessageResponse, PatternRequest,
    SaveInCacheRequest, TokenRequest, TokenResponse, ValidTokenResponse, ValidateTokenRequest,
};

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.cache.as_ref().map(|c| c.backend());
    let stats = match &state.embedded {
        Some(cache) => cache.stats().await.ok(),
        None => None,
    };
    Json(HealthResponse::healthy(backend, stats))
}

// == Cache ==
/// Handler for POST /api/save-in-cache
pub async fn save_in_cache(
    State(state): State<AppState>,
    Json(req): Json<SaveInCacheRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg).into());
    }

    state
        .cache()?
        .set(&req.name, CacheValue::from(req.value), req.expires_in)
        .await?;

    Ok(Json(MessageResponse::ok("Saved in cache")))
}

/// Handler for POST /api/get-from-cache
pub async fn get_from_cache(
    State(state): State<AppState>,
    Json(req): Json<CacheKeyRequest>,
) -> ApiResult<Json<CacheValueResponse>> {
    match state.cache()?.get(&req.name).await? {
        Some(value) => Ok(Json(CacheValueResponse::found(value.into()))),
        None => Err(CacheError::NotFound(req.name).into()),
    }
}

/// Handler for POST /api/delete-from-cache
pub async fn delete_from_cache(
    State(state): State<AppState>,
    Json(req): Json<CacheKeyRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state.cache()?.delete(&req.name).await?;
    Ok(Json(MessageResponse::ok("Deleted from cache (if it existed)")))
}

/// Handler for POST /api/empty-cache
pub async fn empty_cache(State(state): State<AppState>) -> ApiResult<Json<MessageResponse>> {
    state.cache()?.empty().await?;
    Ok(Json(MessageResponse::ok("Emptied cache")))
}

/// Handler for POST /api/empty-cache-by-match
pub async fn empty_cache_by_match(
    State(state): State<AppState>,
    Json(req): Json<PatternRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if req.pattern.is_empty() {
        return Err(AppError::BadRequest("Pattern cannot be empty".to_string()));
    }
    state.cache()?.empty_by_match(&req.pattern).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Emptied cache entries matching '{}'",
        req.pattern
    ))))
}

// == Tokens ==
/// Handler for POST /api/tokens
///
/// Exchanges credentials for a bearer token. Any previous token of the user
/// stops working.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state
        .users
        .get_by_email(&req.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !user.password_matches(&req.password)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.tokens.generate(user.id);
    state.tokens.insert(&token, &user).await?;
    debug!(user_id = user.id, "bearer token issued");

    Ok(Json(TokenResponse {
        token: token.plain_text,
        expires: token.expires,
    }))
}

/// Handler for GET /api/me
pub async fn me(BearerUser(user): BearerUser) -> Json<User> {
    Json(user)
}

/// Handler for POST /api/validate-token
pub async fn validate_token(
    State(state): State<AppState>,
    Json(req): Json<ValidateTokenRequest>,
) -> ApiResult<Json<ValidTokenResponse>> {
    let valid = state.tokens.valid_token(&req.token).await?;
    Ok(Json(ValidTokenResponse { valid }))
}
