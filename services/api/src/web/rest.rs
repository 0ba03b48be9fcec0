//! services/api/src/web/rest.rs
//!
//! The master definition of the OpenAPI document, plus the service-level
//! endpoints that sit outside `/api`.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi, ToSchema,
};

use crate::error::ApiError;
use crate::web::state::AppState;
use crate::web::{auth, favorites, poems, progress, readings, students, views};
use crate::web::response::{FieldError, Pagination};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_handler,
        auth::login_handler,
        auth::refresh_token_handler,
        auth::get_profile_handler,
        auth::update_profile_handler,
        auth::logout_handler,
        poems::list_poems_handler,
        poems::get_poem_handler,
        poems::create_poem_handler,
        poems::update_poem_handler,
        poems::delete_poem_handler,
        readings::list_readings_handler,
        readings::create_reading_handler,
        readings::reading_stats_handler,
        readings::get_reading_handler,
        readings::update_reading_handler,
        readings::upload_recording_handler,
        favorites::list_favorites_handler,
        favorites::toggle_favorite_handler,
        favorites::remove_favorite_handler,
        favorites::check_favorite_handler,
        progress::progress_history_handler,
        progress::current_progress_handler,
        progress::monthly_progress_handler,
        progress::set_goal_handler,
        progress::class_progress_handler,
        progress::user_progress_handler,
        students::list_students_handler,
        students::create_student_handler,
        students::update_student_handler,
        students::deactivate_student_handler,
    ),
    components(schemas(
        HealthResponse,
        FieldError,
        Pagination,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::RefreshRequest,
        auth::UpdateProfileRequest,
        auth::AuthResponse,
        auth::RefreshResponse,
        auth::ProfileResponse,
        poems::CreatePoemRequest,
        poems::UpdatePoemRequest,
        readings::CreateReadingRequest,
        readings::UpdateReadingRequest,
        readings::ReadingResult,
        favorites::ToggleFavoriteRequest,
        progress::GoalRequest,
        students::CreateStudentRequest,
        students::UpdateStudentRequest,
        views::UserView,
        views::PoemView,
        views::ReadingView,
        views::MistakeView,
        views::MistakeInput,
        views::SessionPayload,
        views::ReadingStatsView,
        views::ProgressView,
        views::MonthlyView,
        views::ClassOverviewView,
        views::FavoriteView,
        views::FavoriteStatus,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration, sign-in and profile."),
        (name = "poems", description = "The poem catalogue."),
        (name = "readings", description = "Reading attempts and recordings."),
        (name = "favorites", description = "Favorite poems."),
        (name = "progress", description = "Weekly progress and class overview."),
        (name = "students", description = "Class roster management.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Service Endpoints
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = HealthResponse))
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Server is running".to_string(),
        timestamp: Utc::now(),
        environment: state.config.environment.as_str().to_string(),
    })
}

/// Router fallback.
pub async fn not_found_handler() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}
