//! Expense, income, and finance summary handlers
//!
//! The summary is cached per (user, date range) for a short TTL; any
//! expense or income mutation invalidates the user's cached summaries.

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
use crate::AppState;
use lessonbook_common::{
    db::{
        models::{Expense, Income},
        EntryFilter, EntryPatch, NewEntry, Repository,
    },
    errors::{AppError, Result},
    finance::{DateRange, FinanceAggregator, FinanceSummary},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEntryRequest {
    pub date: DateTime<FixedOffset>,

    #[validate(range(min = 0))]
    pub amount: i64,

    #[validate(length(min = 1, max = 100))]
    pub category: String,

    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEntryRequest {
    pub date: Option<DateTime<FixedOffset>>,
    pub amount: Option<i64>,
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntryListQuery {
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
    pub category: Option<String>,
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub start_date: Option<DateTime<FixedOffset>>,
    pub end_date: Option<DateTime<FixedOffset>>,
}

#[derive(Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub date: String,
    pub amount: i64,
    pub category: String,
    pub description: Option<String>,
}

impl From<Expense> for EntryResponse {
    fn from(e: Expense) -> Self {
        Self {
            id: e.id,
            date: e.date.to_rfc3339(),
            amount: e.amount,
            category: e.category,
            description: e.description,
        }
    }
}

impl From<Income> for EntryResponse {
    fn from(i: Income) -> Self {
        Self {
            id: i.id,
            date: i.date.to_rfc3339(),
            amount: i.amount,
            category: i.category,
            description: i.description,
        }
    }
}

impl EntryListQuery {
    fn filter(&self) -> EntryFilter {
        EntryFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            category: self.category.clone(),
            offset: self.skip,
            limit: Some(self.limit.min(500)),
        }
    }
}

impl UpdateEntryRequest {
    fn patch(self) -> EntryPatch {
        EntryPatch {
            date: self.date,
            amount: self.amount,
            category: self.category,
            description: self.description.map(Some),
        }
    }
}

fn summary_cache_key(user_id: Uuid, query: &SummaryQuery) -> String {
    format!(
        "finance:{}:{}:{}",
        user_id,
        query
            .start_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "*".into()),
        query
            .end_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "*".into()),
    )
}

async fn invalidate_summaries(state: &AppState, user_id: Uuid) {
    state
        .cache
        .invalidate_prefix(&format!("finance:{}", user_id))
        .await;
}

// ============================================================================
// Expenses
// ============================================================================

pub async fn list_expenses(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<EntryListQuery>,
) -> Result<Json<Vec<EntryResponse>>> {
    let repo = Repository::new(state.db.clone());
    let expenses = repo.list_expenses(current.id, &query.filter()).await?;
    Ok(Json(expenses.into_iter().map(Into::into).collect()))
}

pub async fn create_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let expense = repo
        .create_expense(
            current.id,
            NewEntry {
                date: request.date,
                amount: request.amount,
                category: request.category,
                description: request.description,
            },
        )
        .await?;

    invalidate_summaries(&state, current.id).await;
    Ok((StatusCode::CREATED, Json(expense.into())))
}

pub async fn update_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEntryRequest>,
) -> Result<Json<EntryResponse>> {
    let repo = Repository::new(state.db.clone());
    let expense = repo.update_expense(current.id, id, request.patch()).await?;

    invalidate_summaries(&state, current.id).await;
    Ok(Json(expense.into()))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.delete_expense(current.id, id).await?;

    invalidate_summaries(&state, current.id).await;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Incomes
// ============================================================================

pub async fn list_incomes(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<EntryListQuery>,
) -> Result<Json<Vec<EntryResponse>>> {
    let repo = Repository::new(state.db.clone());
    let incomes = repo.list_incomes(current.id, &query.filter()).await?;
    Ok(Json(incomes.into_iter().map(Into::into).collect()))
}

pub async fn create_income(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
    })?;

    let repo = Repository::new(state.db.clone());
    let income = repo
        .create_income(
            current.id,
            NewEntry {
                date: request.date,
                amount: request.amount,
                category: request.category,
                description: request.description,
            },
        )
        .await?;

    invalidate_summaries(&state, current.id).await;
    Ok((StatusCode::CREATED, Json(income.into())))
}

pub async fn update_income(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEntryRequest>,
) -> Result<Json<EntryResponse>> {
    let repo = Repository::new(state.db.clone());
    let income = repo.update_income(current.id, id, request.patch()).await?;

    invalidate_summaries(&state, current.id).await;
    Ok(Json(income.into()))
}

pub async fn delete_income(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let repo = Repository::new(state.db.clone());
    repo.delete_income(current.id, id).await?;

    invalidate_summaries(&state, current.id).await;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Summary
// ============================================================================

/// Totals, net income, and per-category breakdowns for an optional
/// inclusive date range
pub async fn finance_summary(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<FinanceSummary>> {
    let key = summary_cache_key(current.id, &query);
    if let Some(cached) = state.cache.get::<FinanceSummary>(&key).await {
        return Ok(Json(cached));
    }

    let aggregator = FinanceAggregator::new(state.db.clone());
    let summary = aggregator
        .summarize(
            current.id,
            DateRange {
                start: query.start_date,
                end: query.end_date,
            },
        )
        .await?;

    state.cache.set(&key, &summary).await;
    Ok(Json(summary))
}
