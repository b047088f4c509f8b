//! Request extractors

use axum::{extract::FromRequestParts, http::request::Parts};
use lessonbook_common::{
    auth::extract_bearer,
    db::Repository,
    errors::AppError,
};
use uuid::Uuid;

use crate::AppState;

/// The authenticated caller, resolved from the bearer token.
///
/// Every owner-scoped handler takes this extractor; rejection is a 401 before
/// the handler body runs.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header is not a bearer token".to_string(),
        })?;

        let claims = state.jwt.validate_token(token)?;
        let user_id = claims.user_id()?;

        let user = Repository::new(state.db.clone())
            .find_user_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Unknown or inactive user".to_string(),
            })?;

        Ok(CurrentUser {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        })
    }
}
