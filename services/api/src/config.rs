//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. The resulting `Config` is immutable and
//! handed to each component explicitly.

use chrono::Duration;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{warn, Level};

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Deployment environment. Controls how much detail error responses expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    fn parse_or_default(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" => Environment::Development,
            "production" => Environment::Production,
            "test" => Environment::Test,
            other => {
                warn!("Unrecognized APP_ENV '{}', falling back to development", other);
                Environment::Development
            }
        }
    }
}

/// Signing and lifetime settings for issued credentials.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
    pub audience: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub path: PathBuf,
    pub max_file_size: usize,
    pub allowed_types: Vec<String>,
}

/// Fixed-window thresholds for the global, login and register limiters.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window: std::time::Duration,
    pub max_requests: u32,
    pub login_window: std::time::Duration,
    pub login_max_attempts: u32,
    pub register_window: std::time::Duration,
    pub register_max_attempts: u32,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub environment: Environment,
    pub log_level: Level,
    pub jwt: JwtConfig,
    pub cors_origin: String,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));

        // --- Server and Database Settings ---
        let bind_address =
            parse_var("BIND_ADDRESS", var("BIND_ADDRESS"), "0.0.0.0:5000".parse::<SocketAddr>())?;
        let database_url = required("DATABASE_URL")?;
        let database_max_connections = parse_var(
            "DATABASE_MAX_CONNECTIONS",
            var("DATABASE_MAX_CONNECTIONS"),
            Ok::<u32, std::num::ParseIntError>(5),
        )?;
        let environment = var("APP_ENV")
            .map(|raw| Environment::parse_or_default(&raw))
            .unwrap_or(Environment::Development);

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Credential Settings ---
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            access_ttl: duration_var("JWT_EXPIRES_IN", var("JWT_EXPIRES_IN"), "7d")?,
            refresh_ttl: duration_var(
                "JWT_REFRESH_EXPIRES_IN",
                var("JWT_REFRESH_EXPIRES_IN"),
                "30d",
            )?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "reading-practice-api".to_string()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "reading-practice-app".to_string()),
        };

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Upload Settings ---
        let max_file_size = parse_var(
            "MAX_FILE_SIZE",
            var("MAX_FILE_SIZE"),
            Ok::<usize, std::num::ParseIntError>(10 * MIB),
        )?;
        if !(KIB..=50 * MIB).contains(&max_file_size) {
            return Err(ConfigError::InvalidValue(
                "MAX_FILE_SIZE".to_string(),
                "must be between 1KB and 50MB".to_string(),
            ));
        }
        let allowed_types = var("ALLOWED_FILE_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                ["audio/mpeg", "audio/wav", "audio/mp3", "audio/ogg"]
                    .map(String::from)
                    .to_vec()
            });
        let upload = UploadConfig {
            path: var("UPLOAD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            max_file_size,
            allowed_types,
        };

        // --- Rate Limiting ---
        let window_ms = parse_var(
            "RATE_LIMIT_WINDOW_MS",
            var("RATE_LIMIT_WINDOW_MS"),
            Ok::<u64, std::num::ParseIntError>(15 * 60 * 1000),
        )?;
        let rate_limit = RateLimitConfig {
            window: std::time::Duration::from_millis(window_ms),
            max_requests: parse_var(
                "RATE_LIMIT_MAX_REQUESTS",
                var("RATE_LIMIT_MAX_REQUESTS"),
                Ok::<u32, std::num::ParseIntError>(100),
            )?,
            login_window: std::time::Duration::from_secs(15 * 60),
            login_max_attempts: parse_var(
                "LOGIN_RATE_LIMIT_MAX",
                var("LOGIN_RATE_LIMIT_MAX"),
                Ok::<u32, std::num::ParseIntError>(5),
            )?,
            register_window: std::time::Duration::from_secs(60 * 60),
            register_max_attempts: parse_var(
                "REGISTER_RATE_LIMIT_MAX",
                var("REGISTER_RATE_LIMIT_MAX"),
                Ok::<u32, std::num::ParseIntError>(3),
            )?,
        };

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            environment,
            log_level,
            jwt,
            cors_origin,
            upload,
            rate_limit,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

/// Parses `raw` when present, otherwise falls back to `default`.
fn parse_var<T, E>(
    key: &str,
    raw: Option<String>,
    default: Result<T, E>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    E: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}

fn duration_var(key: &str, raw: Option<String>, default: &str) -> Result<Duration, ConfigError> {
    let raw = raw.unwrap_or_else(|| default.to_string());
    parse_duration(&raw).ok_or_else(|| {
        ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a duration (e.g. 3600, 15m, 12h, 7d)", raw),
        )
    })
}

/// Parses `90`, `90s`, `15m`, `12h` or `7d`. Zero is rejected.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: i64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    match unit {
        "" | "s" => Some(Duration::seconds(value)),
        "m" => Some(Duration::minutes(value)),
        "h" => Some(Duration::hours(value)),
        "d" => Some(Duration::days(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/reading"),
        ("JWT_SECRET", "s3cret"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.bind_address.port(), 5000);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.jwt.access_ttl, Duration::days(7));
        assert_eq!(config.jwt.refresh_ttl, Duration::days(30));
        assert_eq!(config.upload.max_file_size, 10 * MIB);
        assert_eq!(config.upload.allowed_types.len(), 4);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.login_max_attempts, 5);
        assert_eq!(config.rate_limit.register_max_attempts, 3);
    }

    #[test]
    fn secret_and_database_are_required() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref k) if k == "JWT_SECRET"));

        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref k) if k == "DATABASE_URL"));
    }

    #[test]
    fn file_size_bounds_are_enforced() {
        let mut pairs = BASE.to_vec();
        pairs.push(("MAX_FILE_SIZE", "100"));
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref k, _) if k == "MAX_FILE_SIZE"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("APP_ENV", "production"),
            ("JWT_EXPIRES_IN", "15m"),
            ("ALLOWED_FILE_TYPES", "audio/webm, Audio/OGG"),
            ("RATE_LIMIT_WINDOW_MS", "60000"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.is_development());
        assert_eq!(config.jwt.access_ttl, Duration::minutes(15));
        assert_eq!(config.upload.allowed_types, vec!["audio/webm", "audio/ogg"]);
        assert_eq!(config.rate_limit.window, std::time::Duration::from_secs(60));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("3600"), Some(Duration::hours(1)));
        assert_eq!(parse_duration("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("0"), None);
        assert_eq!(parse_duration("7w"), None);
        assert_eq!(parse_duration("d"), None);
    }
}
