//! API Routes
//!
//! Configures the Axum router with every endpoint.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_from_cache, empty_cache, empty_cache_by_match, get_from_cache, health_handler,
    issue_token, me, save_in_cache, validate_token,
};
use super::accounts::{create_user, delete_user, get_all_users, get_user, update_user};
use super::middleware::check_remember;
use super::users::{
    flash, forgot_password, login, logout, reset_password, reset_password_form,
};
use super::AppState;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - Remember-me: restores a session from the remember cookie
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/save-in-cache", post(save_in_cache))
        .route("/get-from-cache", post(get_from_cache))
        .route("/delete-from-cache", post(delete_from_cache))
        .route("/empty-cache", post(empty_cache))
        .route("/empty-cache-by-match", post(empty_cache_by_match))
        .route("/tokens", post(issue_token))
        .route("/me", get(me))
        .route("/validate-token", post(validate_token))
        .route("/create-user", post(create_user))
        .route("/get-all-users", get(get_all_users))
        .route("/get-user/:id", get(get_user))
        .route("/update-user/:id", post(update_user))
        .route("/delete-user/:id", post(delete_user));

    let users = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/flash", get(flash))
        .route("/forgot-password", post(forgot_password))
        .route(
            "/reset-password",
            get(reset_password_form).post(reset_password),
        )
        .layer(middleware::from_fn_with_state(state.clone(), check_remember));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .nest("/users", users)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
