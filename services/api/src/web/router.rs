//! services/api/src/web/router.rs
//!
//! Assembles the HTTP surface: public routes, authenticated routes and the
//! role-restricted routes, with the rate limiters and service-level layers.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use crate::error::ApiError;
use crate::web::middleware::{
    authenticate, expose_error_detail, global_rate_limit, login_rate_limit, register_rate_limit,
    require_ownership_or_admin, require_role, TEACHING_ROLES,
};
use crate::web::rest::{health_handler, not_found_handler, ApiDoc};
use crate::web::state::AppState;
use crate::web::{auth, favorites, poems, progress, readings, students};

/// Headroom above the recording limit for the multipart framing and text fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Builds the complete application router.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ApiError> {
    let cors = cors_layer(&state.config.cors_origin)?;
    let body_limit = state.config.upload.max_file_size + MULTIPART_OVERHEAD;

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_router(state.clone()))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/uploads", ServeDir::new(&state.config.upload.path))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    if state.config.is_development() {
        app = app.layer(from_fn(expose_error_detail));
    }
    Ok(app.with_state(state))
}

fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route(
            "/auth/register",
            post(auth::register_handler)
                .route_layer(from_fn_with_state(state.clone(), register_rate_limit)),
        )
        .route(
            "/auth/login",
            post(auth::login_handler)
                .route_layer(from_fn_with_state(state.clone(), login_rate_limit)),
        )
        .route("/auth/refresh-token", post(auth::refresh_token_handler));

    // Protected routes (auth required). The role and ownership checks are
    // merged in first so that `authenticate` wraps them and runs before.
    let protected_routes = Router::new()
        .route(
            "/auth/profile",
            get(auth::get_profile_handler).put(auth::update_profile_handler),
        )
        .route("/auth/logout", post(auth::logout_handler))
        .route("/poems", get(poems::list_poems_handler))
        .route("/poems/{poem_id}", get(poems::get_poem_handler))
        .route(
            "/readings",
            get(readings::list_readings_handler).post(readings::create_reading_handler),
        )
        .route("/readings/stats", get(readings::reading_stats_handler))
        .route(
            "/readings/{reading_id}",
            get(readings::get_reading_handler).put(readings::update_reading_handler),
        )
        .route(
            "/readings/{reading_id}/recording",
            post(readings::upload_recording_handler),
        )
        .route(
            "/favorites",
            get(favorites::list_favorites_handler).post(favorites::toggle_favorite_handler),
        )
        .route(
            "/favorites/{poem_id}",
            delete(favorites::remove_favorite_handler),
        )
        .route(
            "/favorites/check/{poem_id}",
            get(favorites::check_favorite_handler),
        )
        .route("/progress", get(progress::progress_history_handler))
        .route("/progress/current", get(progress::current_progress_handler))
        .route("/progress/monthly", get(progress::monthly_progress_handler))
        .route("/progress/goal", put(progress::set_goal_handler))
        .merge(teaching_routes())
        .merge(owner_routes())
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(state, global_rate_limit))
}

/// Routes open to teachers and admins only.
fn teaching_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/poems", post(poems::create_poem_handler))
        .route(
            "/poems/{poem_id}",
            put(poems::update_poem_handler).delete(poems::delete_poem_handler),
        )
        .route("/progress/class", get(progress::class_progress_handler))
        .route(
            "/users/students",
            get(students::list_students_handler).post(students::create_student_handler),
        )
        .route(
            "/users/students/{user_id}",
            put(students::update_student_handler).delete(students::deactivate_student_handler),
        )
        .route_layer(from_fn_with_state(TEACHING_ROLES, require_role))
}

/// Routes scoped to the `user_id` in the path.
fn owner_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/progress/users/{user_id}",
            get(progress::user_progress_handler),
        )
        .route_layer(from_fn(require_ownership_or_admin))
}

/// Accepts a comma-separated list of origins.
fn cors_layer(raw: &str) -> Result<CorsLayer, ApiError> {
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|_| {
                ConfigError::InvalidValue("CORS_ORIGIN".to_string(), origin.to_string())
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]))
}
