//! Account endpoints: sign-up, login, profile and Admin user management.

use crate::core::user::{self, NewUser, Principal, ProfileUpdate, UserForm};
use crate::errors::Result;
use crate::web::AppState;
use crate::web::response::{created, empty_success, success};
use axum::Json;
use axum::extract::{Path, State};
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;

/// Body of `POST /api/users/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Clear-text password
    pub password: String,
}

/// `POST /api/users/register`
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<NewUser>,
) -> Result<Response> {
    let user = user::register(&state.db, body, Utc::now()).await?;
    Ok(created(user, "Registration successful"))
}

/// `POST /api/users/login` - checks credentials for the session gateway.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response> {
    let user = user::authenticate(&state.db, &body.email, &body.password).await?;
    Ok(success(user, "Login successful"))
}

/// `GET /api/users/me`
pub async fn me(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let user = user::get_user(&state.db, principal.user_id)
        .await?
        .ok_or(crate::errors::Error::UserNotFound {
            user_id: principal.user_id,
        })?;
    Ok(success(user, "Current user"))
}

/// `PUT /api/users/me` - edit the caller's own profile.
pub async fn update_me(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<ProfileUpdate>,
) -> Result<Response> {
    let user = user::update_profile(&state.db, &principal, body).await?;
    Ok(success(user, "Profile updated successfully"))
}

/// `GET /api/users` (Admin)
pub async fn list(State(state): State<AppState>, principal: Principal) -> Result<Response> {
    let users = user::list_users(&state.db, &principal).await?;
    Ok(success(users, "Users retrieved"))
}

/// `POST /api/users` (Admin) - create or edit depending on `user_id`.
pub async fn save(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<UserForm>,
) -> Result<Response> {
    let is_new = body.user_id.is_none();
    let user = user::admin_save_user(&state.db, &principal, body, Utc::now()).await?;
    Ok(if is_new {
        created(user, "User created successfully")
    } else {
        success(user, "User updated successfully")
    })
}

/// `GET /api/users/:id` (Admin)
pub async fn get(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<i64>,
) -> Result<Response> {
    principal.require_admin()?;
    let user = user::get_user(&state.db, user_id)
        .await?
        .ok_or(crate::errors::Error::UserNotFound { user_id })?;
    Ok(success(user, "User retrieved"))
}

/// `DELETE /api/users/:id` (Admin)
pub async fn delete(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<i64>,
) -> Result<Response> {
    user::delete_user(&state.db, &principal, user_id).await?;
    Ok(empty_success("User deleted successfully"))
}
