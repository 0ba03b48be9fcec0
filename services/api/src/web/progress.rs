//! services/api/src/web/progress.rs
//!
//! Weekly progress endpoints for students, and the class view for teachers.

use axum::{extract::State, response::IntoResponse, Extension};
use chrono::{Datelike, Utc};
use reading_practice_core::domain::{Role, User};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::progress::MAX_HISTORY_WEEKS;
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::response::ok;
use crate::web::state::AppState;
use crate::web::validation::Validator;
use crate::web::views::{ClassOverviewView, MonthlyView, ProgressView};

const DEFAULT_HISTORY_WEEKS: u32 = 4;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Number of weeks, current week included.
    pub weeks: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ClassQuery {
    /// Admins only; teachers always see their own class.
    pub class_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoalRequest {
    pub weekly_goal: Option<u32>,
}

async fn history_views(
    state: &AppState,
    user_id: Uuid,
    weeks: Option<u32>,
) -> Result<Vec<ProgressView>, ApiError> {
    let mut v = Validator::new();
    v.range(weeks, "weeks", 1, MAX_HISTORY_WEEKS);
    v.finish()?;
    let history = state
        .progress
        .history(user_id, weeks.unwrap_or(DEFAULT_HISTORY_WEEKS))
        .await?;
    Ok(history.into_iter().map(ProgressView::from).collect())
}

/// Recent weekly records of the signed-in user, newest first.
#[utoipa::path(
    get,
    path = "/api/progress",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Weekly history", body = [ProgressView]),
        (status = 400, description = "Invalid week count")
    ),
    security(("bearer" = [])),
    tag = "progress"
)]
pub async fn progress_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let views = history_views(&state, user.id, query.weeks).await?;
    Ok(ok("Progress loaded", views))
}

#[utoipa::path(
    get,
    path = "/api/progress/current",
    responses((status = 200, description = "Current week", body = ProgressView)),
    security(("bearer" = [])),
    tag = "progress"
)]
pub async fn current_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state.progress.refresh_current_week(user.id).await?;
    Ok(ok("Current week loaded", ProgressView::from(progress)))
}

/// Weeks starting in a calendar month, with totals. Defaults to the current month.
#[utoipa::path(
    get,
    path = "/api/progress/monthly",
    params(MonthQuery),
    responses(
        (status = 200, description = "Monthly summary", body = MonthlyView),
        (status = 400, description = "Invalid month")
    ),
    security(("bearer" = [])),
    tag = "progress"
)]
pub async fn monthly_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<MonthQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let today = Utc::now().date_naive();
    let year = query.year.unwrap_or_else(|| today.year());
    let month = query.month.unwrap_or_else(|| today.month());

    let mut v = Validator::new();
    v.range(Some(year), "year", 2000, 2100)
        .range(Some(month), "month", 1, 12);
    v.finish()?;

    let summary = state
        .progress
        .monthly(user.id, year, month)
        .await?
        .ok_or_else(|| ApiError::field("month", "month must be between 1 and 12"))?;
    Ok(ok("Monthly summary loaded", MonthlyView::new(year, month, summary)))
}

/// Set the number of completed readings aimed for this week.
#[utoipa::path(
    put,
    path = "/api/progress/goal",
    request_body = GoalRequest,
    responses(
        (status = 200, description = "Goal set", body = ProgressView),
        (status = 400, description = "Goal outside 1..=50")
    ),
    security(("bearer" = [])),
    tag = "progress"
)]
pub async fn set_goal_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppJson(payload): AppJson<GoalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.check(
        payload.weekly_goal.is_some(),
        "weeklyGoal",
        "weeklyGoal is required",
    )
    .range(payload.weekly_goal, "weeklyGoal", 1, 50);
    v.finish()?;
    let goal = payload.weekly_goal.unwrap_or_default();

    let progress = state.progress.set_weekly_goal(user.id, goal).await?;
    Ok(ok("Weekly goal updated", ProgressView::from(progress)))
}

/// Current-week progress for every student of the caller's class.
#[utoipa::path(
    get,
    path = "/api/progress/class",
    params(ClassQuery),
    responses(
        (status = 200, description = "Class overview", body = ClassOverviewView),
        (status = 403, description = "Not a teacher or admin, or no class assigned")
    ),
    security(("bearer" = [])),
    tag = "progress"
)]
pub async fn class_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<ClassQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let class_id = match user.role {
        Role::Admin => query.class_id.filter(|c| !c.trim().is_empty()),
        _ => Some(
            user.class_id
                .clone()
                .ok_or_else(|| ApiError::Forbidden("No class is assigned to this account".to_string()))?,
        ),
    };
    let overview = state.progress.class_overview(class_id).await?;
    Ok(ok("Class progress loaded", ClassOverviewView::from(overview)))
}

/// Weekly history of a given user. Owners and admins only.
#[utoipa::path(
    get,
    path = "/api/progress/users/{user_id}",
    params(("user_id" = Uuid, Path, description = "User id"), HistoryQuery),
    responses(
        (status = 200, description = "Weekly history", body = [ProgressView]),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "progress"
)]
pub async fn user_progress_handler(
    State(state): State<Arc<AppState>>,
    AppPath(user_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.get_user_by_id(user_id).await?;
    let views = history_views(&state, user_id, query.weeks).await?;
    Ok(ok("Progress loaded", views))
}
