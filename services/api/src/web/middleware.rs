//! services/api/src/web/middleware.rs
//!
//! Authentication, authorization and rate-limiting middleware.

use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use reading_practice_core::domain::{Role, User};
use reading_practice_core::policy::{ensure_owner_or_admin, ensure_role};
use reading_practice_core::ports::PortError;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, AuthFailure, InternalErrorDetail};
use crate::security::RateLimiter;
use crate::web::extract::client_key;
use crate::web::state::AppState;

pub const TEACHING_ROLES: &[Role] = &[Role::Teacher, Role::Admin];

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn principal(req: &Request) -> Result<&User, ApiError> {
    req.extensions()
        .get::<User>()
        .ok_or(ApiError::Unauthenticated(AuthFailure::MissingToken))
}

/// Resolves the bearer token to an active `User` and stores it in the request
/// extensions for handlers to use.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token =
        bearer_token(&req).ok_or(ApiError::Unauthenticated(AuthFailure::MissingToken))?;
    let claims = state
        .credentials
        .verify(token, state.credentials.access_audience())?;
    let user_id = claims.user_id()?;

    let user = match state.db.get_user_by_id(user_id).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Unauthenticated(AuthFailure::UnknownUser))
        }
        Err(e) => return Err(e.into()),
    };
    if !user.is_active {
        return Err(ApiError::Unauthenticated(AuthFailure::Deactivated));
    }

    debug!(user_id = %user.id, role = %user.role, "Request authenticated");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Rejects principals whose role is not in `allowed`. Must run after `authenticate`.
pub async fn require_role(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    ensure_role(principal(&req)?, allowed)?;
    Ok(next.run(req).await)
}

/// Admits the owner of the `user_id` path parameter, or an admin.
pub async fn require_ownership_or_admin(
    Path(params): Path<HashMap<String, String>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let owner_id = params
        .get("user_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| ApiError::field("user_id", "Invalid user id"))?;
    ensure_owner_or_admin(principal(&req)?, owner_id)?;
    Ok(next.run(req).await)
}

fn enforce(limiter: &RateLimiter, req: &Request) -> Result<(), ApiError> {
    let key = client_key(req);
    limiter.check(&key).map_err(|retry_after| {
        warn!(scope = limiter.scope(), client = %key, "Rate limit exceeded");
        ApiError::TooManyRequests {
            message: limiter.message().to_string(),
            retry_after_secs: retry_after.as_secs().max(1),
        }
    })
}

pub async fn global_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.limiters.global, &req)?;
    Ok(next.run(req).await)
}

pub async fn login_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.limiters.login, &req)?;
    Ok(next.run(req).await)
}

pub async fn register_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.limiters.register, &req)?;
    Ok(next.run(req).await)
}

/// Development only: rewrites 500 bodies to include the internal error text.
pub async fn expose_error_detail(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(InternalErrorDetail(detail)) = response.extensions().get::<InternalErrorDetail>()
    else {
        return response;
    };
    let body = json!({
        "success": false,
        "message": "An internal error occurred",
        "error": detail,
    });
    (response.status(), Json(body)).into_response()
}
