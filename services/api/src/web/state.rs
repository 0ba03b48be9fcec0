//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::security::{CredentialIssuer, RateLimiter};
use crate::services::ProgressTracker;
use reading_practice_core::ports::DatabaseService;
use std::sync::Arc;

/// The three request counters guarding the API.
pub struct RateLimiters {
    pub global: RateLimiter,
    pub login: RateLimiter,
    pub register: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Self {
        let limits = &config.rate_limit;
        Self {
            global: RateLimiter::new(
                "global",
                limits.max_requests,
                limits.window,
                "Too many requests from this IP, please try again later",
            ),
            login: RateLimiter::new(
                "login",
                limits.login_max_attempts,
                limits.login_window,
                "Too many login attempts, please try again in 15 minutes",
            ),
            register: RateLimiter::new(
                "register",
                limits.register_max_attempts,
                limits.register_window,
                "Too many accounts created, please try again in an hour",
            ),
        }
    }
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub credentials: Arc<CredentialIssuer>,
    pub progress: ProgressTracker,
    pub limiters: Arc<RateLimiters>,
}

impl AppState {
    pub fn new(db: Arc<dyn DatabaseService>, config: Config) -> Self {
        let credentials = Arc::new(CredentialIssuer::new(&config.jwt));
        let limiters = Arc::new(RateLimiters::from_config(&config));
        Self {
            progress: ProgressTracker::new(db.clone()),
            db,
            config: Arc::new(config),
            credentials,
            limiters,
        }
    }
}
