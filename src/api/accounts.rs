//! User account management over the user store.
//!
//! Creating an account is open; reading, changing and removing accounts
//! needs a bearer token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::api::{AppState, BearerUser};
use crate::auth::User;
use crate::error::{ApiResult, AppError};
use crate::models::{
    CreateUserRequest, CreatedUserResponse, MessageResponse, UpdateUserRequest, UserFields,
};

const EMAIL_TAKEN: &str = "This email address is already in use";

/// Handler for POST /api/create-user
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<CreatedUserResponse>)> {
    let mut errors = req.validate();
    if state.users.get_by_email(&req.email).await?.is_some() {
        errors.insert("email".to_string(), EMAIL_TAKEN.to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let user = User::new(req.first_name, req.last_name, req.email, &req.password)?;
    let id = state.users.insert(user).await?.as_i64();
    info!(user_id = id, "user created");

    Ok((StatusCode::CREATED, Json(CreatedUserResponse { id })))
}

/// Handler for GET /api/get-all-users
pub async fn get_all_users(
    State(state): State<AppState>,
    _caller: BearerUser,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.users.all().await?))
}

/// Handler for GET /api/get-user/:id
pub async fn get_user(
    State(state): State<AppState>,
    _caller: BearerUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    Ok(Json(find_user(&state, id).await?))
}

/// Handler for POST /api/update-user/:id
///
/// The merged record is validated as a whole before anything is stored.
pub async fn update_user(
    State(state): State<AppState>,
    BearerUser(caller): BearerUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    let mut user = find_user(&state, id).await?;

    let fields = UserFields {
        first_name: req.first_name.unwrap_or(user.first_name),
        last_name: req.last_name.unwrap_or(user.last_name),
        email: req.email.unwrap_or(user.email),
    };
    let mut errors = fields.validate();
    if let Some(other) = state.users.get_by_email(&fields.email).await? {
        if other.id != id {
            errors.insert("email".to_string(), EMAIL_TAKEN.to_string());
        }
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    user.first_name = fields.first_name;
    user.last_name = fields.last_name;
    user.email = fields.email;
    if let Some(active) = req.active {
        user.active = active;
    }
    state.users.update(&user).await?;
    info!(user_id = id, by = caller.id, "user updated");

    Ok(Json(find_user(&state, id).await?))
}

/// Handler for POST /api/delete-user/:id
///
/// Removes the account along with its bearer tokens and remember-me pairings.
pub async fn delete_user(
    State(state): State<AppState>,
    BearerUser(caller): BearerUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    find_user(&state, id).await?;
    state.users.delete(id).await?;
    info!(user_id = id, by = caller.id, "user deleted");

    Ok(Json(MessageResponse::ok("User deleted")))
}

async fn find_user(state: &AppState, id: i64) -> ApiResult<User> {
    state
        .users
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", id)))
}
