//! Subscription handlers
//!
//! Creating a subscription is a ledger operation: the contract row and the
//! student's counter increase commit together.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extract::CurrentUser;
use crate::handlers::Pagination;
use crate::AppState;
use lessonbook_common::{
    db::{models::Subscription, Repository},
    errors::{AppError, Result},
    ledger::{Ledger, NewSubscription},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub student_id: Uuid,

    #[validate(range(min = 1, max = 1000))]
    pub lessons_count: i32,

    #[validate(range(min = 0))]
    pub price: i64,

    pub start_date: DateTime<FixedOffset>,

    pub end_date: DateTime<FixedOffset>,

    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub lessons_count: i32,
    pub price: i64,
    pub start_date: String,
    pub end_date: String,
    pub notes: Option<String>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            student_id: s.student_id,
            lessons_count: s.lessons_count,
            price: s.price,
            start_date: s.start_date.to_rfc3339(),
            end_date: s.end_date.to_rfc3339(),
            notes: s.notes,
        }
    }
}

/// List the caller's subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<SubscriptionResponse>>> {
    let repo = Repository::new(state.db.clone());
    let subscriptions = repo
        .list_subscriptions(current.id, page.skip, page.limit())
        .await?;
    Ok(Json(subscriptions.into_iter().map(Into::into).collect()))
}

/// Grant a lesson block to a student
pub async fn create_subscription(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    if request.end_date < request.start_date {
        return Err(AppError::Validation {
            message: "end_date must not precede start_date".to_string(),
        });
    }

    let ledger = Ledger::new(state.db.clone());
    let subscription = ledger
        .grant_subscription(
            current.id,
            NewSubscription {
                student_id: request.student_id,
                lessons_count: request.lessons_count,
                price: request.price,
                start_date: request.start_date,
                end_date: request.end_date,
                notes: request.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(subscription.into())))
}

/// Get one subscription by id
pub async fn get_subscription(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SubscriptionResponse>> {
    let repo = Repository::new(state.db.clone());
    let subscription = repo
        .find_subscription(current.id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Subscription", id))?;
    Ok(Json(subscription.into()))
}

/// Subscriptions for one student
pub async fn subscriptions_by_student(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Vec<SubscriptionResponse>>> {
    let repo = Repository::new(state.db.clone());
    let subscriptions = repo
        .subscriptions_by_student(current.id, student_id)
        .await?;
    Ok(Json(subscriptions.into_iter().map(Into::into).collect()))
}

/// Delete the contract row. The lesson block already granted stays on the
/// student's balance.
pub async fn delete_subscription(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.delete_subscription(current.id, id).await?;

    tracing::info!(subscription_id = %id, user_id = %current.id, "Subscription deleted");

    Ok(StatusCode::NO_CONTENT)
}
