//! Cookie-based user flows: login, logout, flash messages and password reset.

use axum::{
    extract::{OriginalUri, Query, State},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::api::middleware::{expired_session_cookie, session_cookie, CurrentSession};
use crate::api::AppState;
use crate::auth::RESET_LINK_MINUTES;
use crate::error::{ApiResult, AppError, AuthError};
use crate::mail::Message;
use crate::models::{
    FlashResponse, ForgotPasswordForm, LoginForm, LoginResponse, MessageResponse,
    ResetFormResponse, ResetPasswordForm, ResetQuery,
};
use crate::session::SessionData;

/// Handler for POST /users/login
///
/// Starts a fresh session for the user and, when asked, stores a
/// remember-me pairing and sets its cookie.
pub async fn login(
    State(state): State<AppState>,
    session: CurrentSession,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let user = state
        .users
        .get_by_email(&form.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !user.password_matches(&form.password)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    let mut jar = jar;
    let mut data = SessionData {
        user_id: Some(user.id),
        ..SessionData::default()
    };

    let remember = form.wants_remember();
    if remember {
        let (hash, cookie) = state.remember.issue(user.id).await?;
        data.remember_token = Some(hash);
        jar = jar.add(cookie);
    }

    if let Some(old) = &session.id {
        state.sessions.destroy(old).await;
    }
    let id = state.sessions.create(data).await;
    info!(user_id = user.id, remember, "user logged in");

    Ok((
        jar.add(session_cookie(&state, id)),
        Json(LoginResponse {
            user_id: user.id,
            remember,
        }),
    ))
}

/// Handler for GET /users/logout
///
/// The pairing to delete comes from the session, never from the cookie.
pub async fn logout(
    State(state): State<AppState>,
    session: CurrentSession,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(hash) = &session.data.remember_token {
        if let Err(e) = state.remember.forget(hash).await {
            warn!(error = %e, "failed to delete remember-me pairing");
        }
    }
    if let Some(id) = &session.id {
        state.sessions.destroy(id).await;
    }

    let jar = jar
        .add(state.remember.expire_cookie())
        .add(expired_session_cookie(&state));
    (jar, Json(MessageResponse::ok("Logged out")))
}

/// Handler for GET /users/flash
///
/// Hands out the session's flash message once, clearing it.
pub async fn flash(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Json<FlashResponse> {
    let flash = match &session.id {
        Some(id) => state.sessions.take_flash(id).await,
        None => None,
    };
    Json(FlashResponse {
        user_id: session.data.user_id,
        flash,
    })
}

/// Handler for POST /users/forgot-password
///
/// Mails a signed reset link to a known user.
pub async fn forgot_password(
    State(state): State<AppState>,
    Form(form): Form<ForgotPasswordForm>,
) -> ApiResult<Json<MessageResponse>> {
    let user = state
        .users
        .get_by_email(&form.email)
        .await?
        .ok_or_else(|| AppError::BadRequest("No user with that email".to_string()))?;

    let email: String = url::form_urlencoded::byte_serialize(user.email.as_bytes()).collect();
    let link = format!("{}/users/reset-password?email={}", state.config.app_url, email);
    let signed = state.signer.sign(&link)?;

    state
        .mailer
        .send(Message {
            from: state.config.mail_from.clone(),
            to: user.email.clone(),
            subject: "Password Reset".to_string(),
            template: "password-reset".to_string(),
            data: serde_json::json!({ "link": signed }),
        })
        .await?;

    info!(user_id = user.id, "password reset link sent");
    Ok(Json(MessageResponse::ok("Password reset link sent")))
}

/// Handler for GET /users/reset-password
///
/// Checks the signed link and hands back the email encrypted, so the
/// follow-up form cannot be pointed at another account.
pub async fn reset_password_form(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(query): Query<ResetQuery>,
) -> ApiResult<Json<ResetFormResponse>> {
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = format!("{}{}", state.config.app_url, path);

    if let Err(e) = state
        .signer
        .check(&url, Duration::minutes(RESET_LINK_MINUTES), Utc::now())
    {
        warn!(error = %e, "rejected password reset link");
        return Err(e.into());
    }

    Ok(Json(ResetFormResponse {
        email: state.encryption.encrypt(&query.email)?,
    }))
}

/// Handler for POST /users/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    session: CurrentSession,
    Form(form): Form<ResetPasswordForm>,
) -> ApiResult<Json<MessageResponse>> {
    if form.password.is_empty() {
        return Err(AppError::BadRequest("Password cannot be empty".to_string()));
    }

    let email = state.encryption.decrypt(&form.email)?;
    let user = state
        .users
        .get_by_email(&email)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    state.users.reset_password(user.id, &form.password).await?;
    info!(user_id = user.id, "password reset");

    let message = "Password reset successfully";
    if let Some(id) = &session.id {
        let data = SessionData {
            flash: Some(message.to_string()),
            ..session.data
        };
        state.sessions.save(id, data).await;
    }

    Ok(Json(MessageResponse::ok(message)))
}
