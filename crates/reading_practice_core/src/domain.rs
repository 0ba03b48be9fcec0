//! crates/reading_practice_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Enumerations
//=========================================================================================

/// Returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant { kind: $kind, value: s.to_string() }),
                }
            }
        }
    };
}

string_enum!(
    /// The role a user acts under. Drives every authorization decision.
    Role, "role", {
        Student => "student",
        Teacher => "teacher",
        Admin => "admin",
    }
);

string_enum!(
    /// Reading proficiency, used both for users and for poems.
    Level, "level", {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
);

string_enum!(Difficulty, "difficulty", {
    Easy => "easy",
    Medium => "medium",
    Hard => "hard",
});

string_enum!(MistakeKind, "mistake type", {
    Pronunciation => "pronunciation",
    Fluency => "fluency",
    Accuracy => "accuracy",
});

string_enum!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

//=========================================================================================
// Users
//=========================================================================================

/// A platform user. Carries no password material.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub level: Level,
    pub class_id: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    /// Expected already normalized (trimmed, lower-cased).
    pub email: String,
    pub hashed_password: String,
    pub name: String,
    pub role: Role,
    pub level: Level,
    pub class_id: Option<String>,
}

/// A partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub level: Option<Level>,
    pub class_id: Option<String>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class_id: Option<String>,
    pub search: Option<String>,
    pub include_inactive: bool,
}

//=========================================================================================
// Poems
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Poem {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub content: String,
    pub theme: String,
    pub level: Level,
    pub difficulty: Difficulty,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub read_count: u32,
    pub average_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPoem {
    pub title: String,
    pub author: String,
    pub content: String,
    pub theme: String,
    pub level: Level,
    pub difficulty: Difficulty,
    pub duration_minutes: u32,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct PoemUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub theme: Option<String>,
    pub level: Option<Level>,
    pub difficulty: Option<Difficulty>,
    pub duration_minutes: Option<u32>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Catalogue query. Inactive poems are always excluded.
#[derive(Debug, Clone, Default)]
pub struct PoemFilter {
    pub level: Option<Level>,
    pub difficulty: Option<Difficulty>,
    pub theme: Option<String>,
    /// Case-insensitive match against title, author and content.
    pub search: Option<String>,
}

//=========================================================================================
// Readings
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Mistake {
    pub word: String,
    pub position: u32,
    pub kind: MistakeKind,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pause_count: u32,
    pub total_pause_seconds: u32,
}

/// A single read-aloud attempt of a poem.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub id: Uuid,
    pub user_id: Uuid,
    pub poem_id: Uuid,
    pub score: f64,
    pub duration_seconds: u32,
    pub completed: bool,
    pub recording_url: Option<String>,
    pub feedback: Option<String>,
    pub mistakes: Vec<Mistake>,
    pub session: Option<SessionData>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReading {
    pub user_id: Uuid,
    pub poem_id: Uuid,
    pub score: f64,
    pub duration_seconds: u32,
    pub completed: bool,
    pub feedback: Option<String>,
    pub mistakes: Vec<Mistake>,
    pub session: Option<SessionData>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadingUpdate {
    pub score: Option<f64>,
    pub duration_seconds: Option<u32>,
    pub completed: Option<bool>,
    pub feedback: Option<String>,
    pub recording_url: Option<String>,
    pub mistakes: Option<Vec<Mistake>>,
    pub session: Option<SessionData>,
}

impl ReadingUpdate {
    /// True when the update touches only fields that stay mutable after completion.
    pub fn touches_only_derived_fields(&self) -> bool {
        self.score.is_none()
            && self.duration_seconds.is_none()
            && self.completed.is_none()
            && self.mistakes.is_none()
            && self.session.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub poem_id: Option<Uuid>,
    pub completed: Option<bool>,
}

/// Half-open time range `[from, until)`; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| instant >= from)
            && self.until.map_or(true, |until| instant < until)
    }
}

//=========================================================================================
// Progress & Favorites
//=========================================================================================

/// Weekly aggregate for one user, keyed by (user_id, week_start).
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_start: DateTime<Utc>,
    pub readings_completed: u32,
    pub total_time_minutes: f64,
    pub average_score: f64,
    pub improvement_percentage: f64,
    pub weekly_goal: Option<u32>,
    pub goal_achieved: bool,
    pub streak_days: u32,
    pub best_score: f64,
    pub worst_score: f64,
    pub total_mistakes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    /// A zeroed record, used when a week has no stored aggregate yet.
    pub fn empty(user_id: Uuid, week_start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            week_start,
            readings_completed: 0,
            total_time_minutes: 0.0,
            average_score: 0.0,
            improvement_percentage: 0.0,
            weekly_goal: None,
            goal_achieved: false,
            streak_days: 0,
            best_score: 0.0,
            worst_score: 0.0,
            total_mistakes: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub poem_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A favorite joined with the poem it points at.
#[derive(Debug, Clone)]
pub struct FavoritePoem {
    pub favorite: Favorite,
    pub poem: Poem,
}

//=========================================================================================
// Pagination
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub request: PageRequest,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.request.limit))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.request.page) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.request.page > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            request: self.request,
            total: self.total,
        }
    }

    /// Slices an already filtered and ordered collection.
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.limit as usize)
            .collect();
        Self {
            items,
            request,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        let err = "janitor".parse::<Role>().unwrap_err();
        assert_eq!(err.kind, "role");
    }

    #[test]
    fn page_math() {
        let page = Page::from_vec((1..=25).collect::<Vec<_>>(), PageRequest::new(3, 10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.has_next());
        assert!(page.has_prev());
    }

    #[test]
    fn page_request_is_clamped() {
        let request = PageRequest::new(0, 1000);
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, PageRequest::MAX_LIMIT);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn completed_readings_only_accept_derived_updates() {
        let update = ReadingUpdate {
            feedback: Some("Nice rhythm".into()),
            ..Default::default()
        };
        assert!(update.touches_only_derived_fields());

        let update = ReadingUpdate {
            score: Some(50.0),
            ..Default::default()
        };
        assert!(!update.touches_only_derived_fields());
    }
}
