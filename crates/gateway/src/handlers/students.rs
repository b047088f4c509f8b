//! Student management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::extract::CurrentUser;
use crate::handlers::Pagination;
use crate::AppState;
use lessonbook_common::{
    db::{models::Student, NewStudent, Repository, StudentPatch},
    errors::{AppError, Result},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100))]
    pub last_name: String,

    #[validate(email)]
    pub email: Option<String>,

    pub phone: Option<String>,

    pub notes: Option<String>,

    #[serde(default)]
    pub total_lessons: i32,

    #[serde(default)]
    pub remaining_lessons: i32,
}

/// Patch body: absent fields stay untouched
#[derive(Debug, Default, Deserialize)]
pub struct UpdateStudentRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub total_lessons: Option<i32>,
    pub remaining_lessons: Option<i32>,
}

#[derive(Serialize)]
pub struct StudentResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub total_lessons: i32,
    pub remaining_lessons: i32,
    pub created_at: String,
}

impl From<Student> for StudentResponse {
    fn from(s: Student) -> Self {
        Self {
            id: s.id,
            first_name: s.first_name,
            last_name: s.last_name,
            email: s.email,
            phone: s.phone,
            notes: s.notes,
            total_lessons: s.total_lessons,
            remaining_lessons: s.remaining_lessons,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

/// List the caller's students
pub async fn list_students(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<StudentResponse>>> {
    let repo = Repository::new(state.db.clone());
    let students = repo
        .list_students(current.id, page.skip, page.limit())
        .await?;
    Ok(Json(students.into_iter().map(Into::into).collect()))
}

/// Register a student
pub async fn create_student(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateStudentRequest>,
) -> Result<(StatusCode, Json<StudentResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let student = repo
        .create_student(
            current.id,
            NewStudent {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
                phone: request.phone,
                notes: request.notes,
                total_lessons: request.total_lessons,
                remaining_lessons: request.remaining_lessons,
            },
        )
        .await?;

    tracing::info!(student_id = %student.id, user_id = %current.id, "Student registered");

    Ok((StatusCode::CREATED, Json(student.into())))
}

/// Get one student by id
pub async fn get_student(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StudentResponse>> {
    let repo = Repository::new(state.db.clone());
    let student = repo
        .find_student(current.id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Student", id))?;
    Ok(Json(student.into()))
}

/// Apply a partial update to a student
pub async fn update_student(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStudentRequest>,
) -> Result<Json<StudentResponse>> {
    let repo = Repository::new(state.db.clone());
    let student = repo
        .update_student(
            current.id,
            id,
            StudentPatch {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email.map(Some),
                phone: request.phone.map(Some),
                notes: request.notes.map(Some),
                total_lessons: request.total_lessons,
                remaining_lessons: request.remaining_lessons,
            },
        )
        .await?;
    Ok(Json(student.into()))
}

/// Delete a student and its lessons and subscriptions
pub async fn delete_student(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.delete_student(current.id, id).await?;

    tracing::info!(student_id = %id, user_id = %current.id, "Student deleted");

    Ok(StatusCode::NO_CONTENT)
}
