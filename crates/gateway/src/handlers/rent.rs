//! Rent settings handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extract::CurrentUser;
use crate::AppState;
use lessonbook_common::{
    db::{models::RentSettings, Repository},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct RentSettingsRequest {
    #[validate(range(min = 0))]
    pub amount: i64,

    #[validate(range(min = 1, max = 31))]
    pub payment_day: i32,
}

#[derive(Serialize)]
pub struct RentSettingsResponse {
    pub id: Uuid,
    pub amount: i64,
    pub payment_day: i32,
}

impl From<RentSettings> for RentSettingsResponse {
    fn from(r: RentSettings) -> Self {
        Self {
            id: r.id,
            amount: r.amount,
            payment_day: r.payment_day,
        }
    }
}

/// Get the caller's rent settings, creating a default row on first read
pub async fn get_rent_settings(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<RentSettingsResponse>> {
    let repo = Repository::new(state.db.clone());

    let settings = match repo.find_rent_settings(current.id).await? {
        Some(settings) => settings,
        None => repo.upsert_rent_settings(current.id, 0, 1).await?,
    };

    Ok(Json(settings.into()))
}

/// Create or replace the caller's rent settings
pub async fn upsert_rent_settings(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RentSettingsRequest>,
) -> Result<Json<RentSettingsResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let settings = repo
        .upsert_rent_settings(current.id, request.amount, request.payment_day)
        .await?;

    tracing::info!(user_id = %current.id, "Rent settings updated");

    Ok(Json(settings.into()))
}
