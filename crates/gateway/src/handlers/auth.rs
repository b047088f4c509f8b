//! Authentication handlers

use axum::{
    extract::State,
    http::StatusCode,
    Form, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extract::CurrentUser;
use crate::AppState;
use lessonbook_common::{
    auth::{hash_password, verify_password},
    db::Repository,
    errors::{AppError, Result},
};

/// OAuth2-style password login form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Request to provision a user (admin only)
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 64))]
    pub username: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub is_active: bool,
    pub is_admin: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,

    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Exchange a username/password pair for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>> {
    let repo = Repository::new(state.db.clone());

    let user = repo
        .find_user_by_username(&form.username)
        .await?
        .filter(|u| u.is_active);

    // Verify against a missing user too so the timing does not reveal
    // whether the username exists.
    let valid = match &user {
        Some(u) => verify_password(&form.password, &u.password_hash),
        None => {
            let _ = verify_password(&form.password, "");
            false
        }
    };

    let user = match (user, valid) {
        (Some(u), true) => u,
        _ => return Err(AppError::InvalidCredentials),
    };

    let access_token = state.jwt.generate_token(user.id)?;

    tracing::info!(user_id = %user.id, "Token issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// Provision a new user account (admin only)
pub async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    if !current.is_admin {
        return Err(AppError::Forbidden {
            message: "Only admins may provision users".to_string(),
        });
    }

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());

    if repo
        .find_user_by_username(&request.username)
        .await?
        .is_some()
    {
        return Err(AppError::Validation {
            message: "username is already taken".to_string(),
        });
    }

    let password_hash = hash_password(&request.password)?;
    let user = repo
        .create_user(request.username, password_hash, request.is_admin)
        .await?;

    tracing::info!(user_id = %user.id, admin = user.is_admin, "User provisioned");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            username: user.username,
            is_active: user.is_active,
            is_admin: user.is_admin,
        }),
    ))
}

/// Change the caller's password after verifying the current one
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let user = repo
        .find_user_by_id(current.id)
        .await?
        .ok_or_else(|| AppError::not_found("User", current.id))?;

    if !verify_password(&request.current_password, &user.password_hash) {
        return Err(AppError::Validation {
            message: "current password is incorrect".to_string(),
        });
    }

    let password_hash = hash_password(&request.new_password)?;
    repo.update_user_password(user.id, password_hash).await?;

    tracing::info!(user_id = %user.id, "Password updated");

    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}
