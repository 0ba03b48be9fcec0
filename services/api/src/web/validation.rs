//! services/api/src/web/validation.rs
//!
//! Request validation. Each check records a field error instead of failing
//! fast so a client sees every problem with its payload at once.

use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::ApiError;
use crate::web::response::FieldError;

pub const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("Invalid regex pattern defined in code")
    })
}

/// Trims and lower-cases an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Collects field errors across a whole payload.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, value: Option<&str>, field: &str) -> &mut Self {
        let present = value.is_some_and(|v| !v.trim().is_empty());
        self.check(present, field, format!("{} is required", field))
    }

    /// Character-length bounds on a trimmed value. Absent values are not checked.
    pub fn length(&mut self, value: Option<&str>, field: &str, min: usize, max: usize) -> &mut Self {
        if let Some(value) = value {
            let len = value.trim().chars().count();
            if len < min {
                self.errors.push(FieldError::new(
                    field,
                    format!("{} must be at least {} characters", field, min),
                ));
            } else if len > max {
                self.errors.push(FieldError::new(
                    field,
                    format!("{} must be at most {} characters", field, max),
                ));
            }
        }
        self
    }

    pub fn range<T: PartialOrd + std::fmt::Display + Copy>(
        &mut self,
        value: Option<T>,
        field: &str,
        min: T,
        max: T,
    ) -> &mut Self {
        if let Some(value) = value {
            self.check(
                value >= min && value <= max,
                field,
                format!("{} must be between {} and {}", field, min, max),
            );
        }
        self
    }

    pub fn email(&mut self, value: Option<&str>, field: &str) -> &mut Self {
        if let Some(value) = value {
            self.check(
                is_valid_email(&normalize_email(value)),
                field,
                "Invalid email format",
            );
        }
        self
    }

    /// Parses an enumerated value, recording an error listing the accepted values.
    pub fn parse<T: FromStr>(&mut self, value: Option<&str>, field: &str, accepted: &[&str]) -> Option<T> {
        let value = value?;
        match value.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                self.errors.push(FieldError::new(
                    field,
                    format!("{} must be one of: {}", field, accepted.join(", ")),
                ));
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

/// The accepted spellings of a string enum, for error messages.
pub fn names<T: Copy>(all: &[T], as_str: fn(T) -> &'static str) -> Vec<&'static str> {
    all.iter().map(|v| as_str(*v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reading_practice_core::Level;

    #[test]
    fn emails() {
        assert!(is_valid_email("emma.martin@ecole.fr"));
        assert!(is_valid_email("a+b@school.co.uk"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert_eq!(normalize_email("  Emma@School.TEST "), "emma@school.test");
    }

    #[test]
    fn collects_every_failure() {
        let mut v = Validator::new();
        v.required(None, "email")
            .length(Some("x"), "name", 2, 100)
            .range(Some(120.0), "score", 0.0, 100.0);
        match v.finish() {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["email", "name", "score"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let mut v = Validator::new();
        v.length(Some("Élodie"), "name", 2, 6);
        assert!(v.is_empty());
    }

    #[test]
    fn enum_parsing_lists_accepted_values() {
        let mut v = Validator::new();
        let accepted = names(Level::ALL, Level::as_str);
        let level: Option<Level> = v.parse(Some("expert"), "level", &accepted);
        assert!(level.is_none());
        match v.finish() {
            Err(ApiError::Validation(errors)) => {
                assert!(errors[0].message.contains("beginner, intermediate, advanced"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
