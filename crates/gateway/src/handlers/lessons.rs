//! Lesson handlers
//!
//! Creation, completion, cancellation, and deletion go through the ledger so
//! the student's balance stays consistent with the lesson lifecycle.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extract::CurrentUser;
use crate::handlers::Pagination;
use crate::AppState;
use lessonbook_common::{
    db::{models::Lesson, LessonPatch, Repository},
    errors::{AppError, Result},
    ledger::{Ledger, NewLesson},
    DEFAULT_LESSON_MINUTES,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    pub student_id: Uuid,

    pub date: DateTime<FixedOffset>,

    /// Minutes; clients may also send this as `duration`
    #[serde(alias = "duration")]
    #[validate(range(min = 1, max = 480))]
    pub duration_minutes: Option<i32>,

    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    pub date: Option<DateTime<FixedOffset>>,

    #[validate(range(min = 1, max = 480))]
    pub duration_minutes: Option<i32>,

    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct LessonResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: String,
    pub duration_minutes: i32,
    pub is_completed: bool,
    pub is_cancelled: bool,
    pub notes: Option<String>,
}

impl From<Lesson> for LessonResponse {
    fn from(l: Lesson) -> Self {
        Self {
            id: l.id,
            student_id: l.student_id,
            date: l.date.to_rfc3339(),
            duration_minutes: l.duration_minutes,
            is_completed: l.is_completed,
            is_cancelled: l.is_cancelled,
            notes: l.notes,
        }
    }
}

/// List the caller's lessons
pub async fn list_lessons(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<LessonResponse>>> {
    let repo = Repository::new(state.db.clone());
    let lessons = repo
        .list_lessons(current.id, page.skip, page.limit())
        .await?;
    Ok(Json(lessons.into_iter().map(Into::into).collect()))
}

/// Schedule a lesson, debiting one credit from the student's balance
pub async fn create_lesson(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateLessonRequest>,
) -> Result<(StatusCode, Json<LessonResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let ledger = Ledger::new(state.db.clone());
    let lesson = ledger
        .schedule_lesson(
            current.id,
            NewLesson {
                student_id: request.student_id,
                date: request.date,
                duration_minutes: request.duration_minutes.unwrap_or(DEFAULT_LESSON_MINUTES),
                notes: request.notes,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(lesson.into())))
}

/// Get one lesson by id
pub async fn get_lesson(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LessonResponse>> {
    let repo = Repository::new(state.db.clone());
    let lesson = repo
        .find_lesson(current.id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Lesson", id))?;
    Ok(Json(lesson.into()))
}

/// Reschedule a lesson or edit its notes. Status changes go through the
/// complete/cancel/delete endpoints.
pub async fn update_lesson(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateLessonRequest>,
) -> Result<Json<LessonResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let lesson = repo
        .update_lesson(
            current.id,
            id,
            LessonPatch {
                date: request.date,
                duration_minutes: request.duration_minutes,
                notes: request.notes.map(Some),
            },
        )
        .await?;
    Ok(Json(lesson.into()))
}

/// Delete a lesson, refunding the credit
pub async fn delete_lesson(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let ledger = Ledger::new(state.db.clone());
    ledger.remove_lesson(current.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark a lesson completed
pub async fn complete_lesson(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LessonResponse>> {
    let ledger = Ledger::new(state.db.clone());
    let lesson = ledger.complete_lesson(current.id, id).await?;
    Ok(Json(lesson.into()))
}

/// Cancel a lesson, refunding the credit
pub async fn cancel_lesson(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LessonResponse>> {
    let ledger = Ledger::new(state.db.clone());
    let lesson = ledger.cancel_lesson(current.id, id).await?;
    Ok(Json(lesson.into()))
}

/// Lessons for one student
pub async fn lessons_by_student(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(student_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<LessonResponse>>> {
    let repo = Repository::new(state.db.clone());
    let lessons = repo
        .lessons_by_student(current.id, student_id, page.skip, page.limit())
        .await?;
    Ok(Json(lessons.into_iter().map(Into::into).collect()))
}

/// Lessons on one calendar day (YYYY-MM-DD, UTC window)
pub async fn lessons_by_date(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(date): Path<String>,
) -> Result<Json<Vec<LessonResponse>>> {
    let day: NaiveDate = date.parse().map_err(|_| AppError::Validation {
        message: format!("'{}' is not a valid date (expected YYYY-MM-DD)", date),
    })?;

    let repo = Repository::new(state.db.clone());
    let lessons = repo.lessons_on_day(current.id, day).await?;
    Ok(Json(lessons.into_iter().map(Into::into).collect()))
}
