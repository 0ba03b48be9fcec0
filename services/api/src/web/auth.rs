//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, token refresh, profile
//! management and logout.

use axum::{
    extract::State,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use reading_practice_core::domain::{Level, NewUser, Role, User, UserUpdate};
use reading_practice_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::error::{ApiError, AuthFailure};
use crate::security::{hash_password, verify_password, TokenPair};
use crate::web::extract::AppJson;
use crate::web::response::{created, ok, ApiResponse};
use crate::web::state::AppState;
use crate::web::validation::{names, normalize_email, Validator, MIN_PASSWORD_LEN};
use crate::web::views::UserView;

/// Roles a visitor may pick when signing up.
const SELF_SERVICE_ROLES: &[Role] = &[Role::Student, Role::Teacher];

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub level: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub level: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserView,
    pub token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(user: &User, tokens: TokenPair) -> Self {
        Self {
            user: user.into(),
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserView,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Register a new student or teacher account.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid data"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Too many registrations from this address")
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.required(payload.email.as_deref(), "email")
        .email(payload.email.as_deref(), "email")
        .required(payload.password.as_deref(), "password")
        .required(payload.name.as_deref(), "name")
        .length(payload.name.as_deref(), "name", 2, 100);
    if let Some(password) = payload.password.as_deref() {
        v.check(
            password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    let role_names = names(SELF_SERVICE_ROLES, Role::as_str);
    let role: Option<Role> = v.parse(payload.role.as_deref(), "role", &role_names);
    if let Some(role) = role {
        v.check(
            SELF_SERVICE_ROLES.contains(&role),
            "role",
            format!("role must be one of: {}", role_names.join(", ")),
        );
    }
    let level: Option<Level> =
        v.parse(payload.level.as_deref(), "level", &names(Level::ALL, Level::as_str));
    v.finish()?;

    let (Some(email), Some(password), Some(name)) = (payload.email, payload.password, payload.name)
    else {
        return Err(ApiError::BadRequest("Missing registration fields".to_string()));
    };

    let new_user = NewUser {
        email: normalize_email(&email),
        hashed_password: hash_password(&password)?,
        name: name.trim().to_string(),
        role: role.unwrap_or(Role::Student),
        level: level.unwrap_or(Level::Beginner),
        class_id: payload
            .class_id
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    };

    let user = state.db.create_user(new_user).await.map_err(|e| match e {
        PortError::Conflict(_) => {
            ApiError::Conflict("A user with this email already exists".to_string())
        }
        other => other.into(),
    })?;
    let tokens = state.credentials.issue(&user)?;

    info!(user_id = %user.id, role = %user.role, "User registered");
    Ok(created(
        "Registration successful",
        AuthResponse::new(&user, tokens),
    ))
}

/// Exchange email and password for a credential pair.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Invalid data"),
        (status = 401, description = "Invalid email or password, or deactivated account"),
        (status = 429, description = "Too many login attempts")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.required(payload.email.as_deref(), "email")
        .email(payload.email.as_deref(), "email")
        .required(payload.password.as_deref(), "password");
    v.finish()?;

    let email = normalize_email(payload.email.as_deref().unwrap_or_default());
    let password = payload.password.unwrap_or_default();

    let credentials = match state.db.get_credentials_by_email(&email).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Unauthenticated(AuthFailure::BadCredentials))
        }
        Err(e) => return Err(e.into()),
    };
    if !credentials.user.is_active {
        return Err(ApiError::Unauthenticated(AuthFailure::Deactivated));
    }
    if !verify_password(&password, &credentials.hashed_password)? {
        return Err(ApiError::Unauthenticated(AuthFailure::BadCredentials));
    }

    let now = Utc::now();
    state.db.record_login(credentials.user.id, now).await?;
    let mut user = credentials.user;
    user.last_login = Some(now);
    let tokens = state.credentials.issue(&user)?;

    info!(user_id = %user.id, "User signed in");
    Ok(ok("Login successful", AuthResponse::new(&user, tokens)))
}

/// Trade a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/api/auth/refresh-token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = RefreshResponse),
        (status = 400, description = "Refresh token missing"),
        (status = 401, description = "Refresh token invalid or expired")
    ),
    tag = "auth"
)]
pub async fn refresh_token_handler(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.required(payload.refresh_token.as_deref(), "refreshToken");
    v.finish()?;
    let token = payload.refresh_token.unwrap_or_default();

    let claims = state
        .credentials
        .verify(token.trim(), state.credentials.refresh_audience())?;
    let user = match state.db.get_user_by_id(claims.user_id()?).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Unauthenticated(AuthFailure::UnknownUser))
        }
        Err(e) => return Err(e.into()),
    };
    if !user.is_active {
        return Err(ApiError::Unauthenticated(AuthFailure::Deactivated));
    }

    let access_token = state.credentials.issue_access(&user)?;
    Ok(ok(
        "Token refreshed",
        RefreshResponse {
            access_token,
            expires_in: state.config.jwt.access_ttl.num_seconds(),
        },
    ))
}

/// The signed-in user's profile.
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current profile", body = ProfileResponse),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn get_profile_handler(Extension(user): Extension<User>) -> impl IntoResponse {
    ok("Profile loaded", ProfileResponse { user: user.into() })
}

/// Update name, level or avatar of the signed-in user.
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid data"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.length(payload.name.as_deref(), "name", 2, 100)
        .length(payload.avatar.as_deref(), "avatar", 1, 500);
    let level: Option<Level> =
        v.parse(payload.level.as_deref(), "level", &names(Level::ALL, Level::as_str));
    v.finish()?;

    let updated = state
        .db
        .update_user(
            user.id,
            UserUpdate {
                name: payload.name.map(|n| n.trim().to_string()),
                level,
                avatar: payload.avatar.map(|a| a.trim().to_string()),
                ..Default::default()
            },
        )
        .await?;
    Ok(ok(
        "Profile updated",
        ProfileResponse {
            user: updated.into(),
        },
    ))
}

/// Acknowledge a sign-out. Credentials are stateless and lapse on their own.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Signed out"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_handler(Extension(user): Extension<User>) -> Json<ApiResponse<()>> {
    info!(user_id = %user.id, "User signed out");
    ApiResponse::done("Logout successful")
}
