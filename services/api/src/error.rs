//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reading_practice_core::{policy::AccessError, ports::PortError};
use tracing::{error, warn};

use crate::config::ConfigError;
use crate::security::jwt::CredentialError;
use crate::web::response::{ApiResponse, FieldError};

/// Why a request could not be tied to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    UnknownUser,
    Deactivated,
    BadCredentials,
}

impl AuthFailure {
    pub fn message(self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "Authentication token required",
            AuthFailure::InvalidToken => "Invalid token",
            AuthFailure::ExpiredToken => "Token expired, please sign in again",
            AuthFailure::UnknownUser => "User not found",
            AuthFailure::Deactivated => "User account is deactivated",
            AuthFailure::BadCredentials => "Invalid email or password",
        }
    }
}

/// Internal failure detail, attached to 500 responses so a development-only
/// middleware can surface it.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the persistence port.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Field-level validation failures of a request body or query.
    #[error("Validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthenticated: {}", .0.message())]
    Unauthenticated(AuthFailure),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests: {message}")]
    TooManyRequests { message: String, retry_after_secs: u64 },

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(resource: &str) -> Self {
        ApiError::NotFound(format!("{} not found", resource))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Port(PortError::Unauthorized) => StatusCode::FORBIDDEN,
            ApiError::Port(PortError::Unexpected(_))
            | ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Expired => ApiError::Unauthenticated(AuthFailure::ExpiredToken),
            CredentialError::NotYetValid | CredentialError::Malformed => {
                ApiError::Unauthenticated(AuthFailure::InvalidToken)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::field("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::field("query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut detail = None;

        let body = match &self {
            ApiError::Validation(errors) => {
                ApiResponse::failure("Invalid data", Some(errors.clone()))
            }
            ApiError::Unauthenticated(failure) => ApiResponse::failure(failure.message(), None),
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => ApiResponse::failure(msg.clone(), None),
            ApiError::TooManyRequests { message, .. } => ApiResponse::failure(message.clone(), None),
            ApiError::Port(PortError::NotFound(msg)) | ApiError::Port(PortError::Conflict(msg)) => {
                ApiResponse::failure(msg.clone(), None)
            }
            ApiError::Port(PortError::Unauthorized) => {
                ApiResponse::failure("Access to this resource is not allowed", None)
            }
            _ => {
                error!("Internal error: {}", self);
                detail = Some(InternalErrorDetail(self.to_string()));
                ApiResponse::failure("An internal error occurred", None)
            }
        };

        if status.is_client_error() {
            warn!(status = status.as_u16(), "{}", self);
        }

        let mut response = (status, Json(body)).into_response();
        if let ApiError::TooManyRequests {
            retry_after_secs, ..
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(PortError::NotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(PortError::Conflict("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(PortError::Unexpected("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn expired_credentials_stay_distinguishable() {
        let err = ApiError::from(CredentialError::Expired);
        assert!(matches!(err, ApiError::Unauthenticated(AuthFailure::ExpiredToken)));
        let err = ApiError::from(CredentialError::Malformed);
        assert!(matches!(err, ApiError::Unauthenticated(AuthFailure::InvalidToken)));
    }

    #[test]
    fn internal_errors_hide_their_detail() {
        let response = ApiError::Internal("pool timed out".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<InternalErrorDetail>().unwrap();
        assert!(detail.0.contains("pool timed out"));
    }

    #[test]
    fn rate_limited_responses_carry_retry_after() {
        let response = ApiError::TooManyRequests {
            message: "slow down".into(),
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
