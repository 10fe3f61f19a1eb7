//! Request extractors and middleware for the cookie and bearer flows.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::auth::User;
use crate::error::AppError;
use crate::session::SessionData;

/// Session id chosen earlier in the same request, overriding the cookie.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

// == Current Session ==
/// The caller's session id (if any) and its data.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub id: Option<String>,
    pub data: SessionData,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let id = match parts.extensions.get::<SessionId>() {
            Some(SessionId(id)) => Some(id.clone()),
            None => CookieJar::from_headers(&parts.headers)
                .get(&state.config.session_cookie_name())
                .map(|c| c.value().to_string()),
        };

        let data = match &id {
            Some(id) => state.sessions.load(id).await,
            None => SessionData::default(),
        };
        Ok(Self { id, data })
    }
}

// == Bearer User ==
/// The user behind a valid `Authorization: Bearer` header.
pub struct BearerUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for BearerUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = state.tokens.authenticate_token(&parts.headers).await?;
        Ok(BearerUser(user))
    }
}

/// Session cookie carrying `id`.
pub fn session_cookie(state: &AppState, id: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((state.config.session_cookie_name(), id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.cookie_secure)
        .build();
    if let Some(domain) = &state.config.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}

/// Emptied session cookie that the browser drops immediately.
pub fn expired_session_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = session_cookie(state, String::new());
    cookie.set_max_age(Duration::ZERO);
    cookie
}

/// Whether `response` already carries a `Set-Cookie` for `name`.
fn sets_cookie(response: &Response, name: &str) -> bool {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v).ok())
        .any(|c| c.name() == name)
}

// == Remember-me Middleware ==
/// Logs a visitor in from the remember-me cookie when the session has no user.
///
/// An unknown or malformed cookie is expired. Storage errors are logged and
/// the request continues anonymously.
pub async fn check_remember(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = jar
        .get(&state.config.session_cookie_name())
        .map(|c| c.value().to_string());
    let session = match &session_id {
        Some(id) => state.sessions.load(id).await,
        None => SessionData::default(),
    };

    if session.is_logged_in() {
        return next.run(request).await;
    }
    let Some(cookie) = jar.get(state.remember.cookie_name()) else {
        return next.run(request).await;
    };

    match state.remember.check(cookie.value()).await {
        Ok(Some((user_id, hash))) => {
            let id = match &session_id {
                Some(old) => state.sessions.renew(old).await,
                None => state.sessions.create(SessionData::default()).await,
            };
            let data = SessionData {
                user_id: Some(user_id),
                remember_token: Some(hash),
                ..session
            };
            state.sessions.save(&id, data).await;
            debug!(user_id, "session restored from remember-me cookie");

            request.extensions_mut().insert(SessionId(id.clone()));
            let response = next.run(request).await;
            // The handler may have ended the session it was handed.
            if sets_cookie(&response, &state.config.session_cookie_name()) {
                return response;
            }
            (jar.add(session_cookie(&state, id)), response).into_response()
        }
        Ok(None) => {
            debug!("stale remember-me cookie expired");
            let jar = jar.add(state.remember.expire_cookie());
            (jar, next.run(request).await).into_response()
        }
        Err(e) => {
            warn!(error = %e, "remember-me lookup failed");
            next.run(request).await
        }
    }
}
