//! crates/reading_practice_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Favorite, FavoritePoem, NewPoem, NewReading, NewUser, Page, PageRequest, Poem, PoemFilter,
    PoemUpdate, Progress, Reading, ReadingFilter, ReadingUpdate, StudentFilter, TimeRange, User,
    UserCredentials, UserUpdate,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---

    /// Fails with `PortError::Conflict` when the email is already registered.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    /// Looks up by normalized email, regardless of the active flag.
    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User>;

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()>;

    /// Students only, newest first.
    async fn list_students(
        &self,
        filter: &StudentFilter,
        page: PageRequest,
    ) -> PortResult<Page<User>>;

    // --- Poem Catalogue ---

    async fn create_poem(&self, new_poem: NewPoem) -> PortResult<Poem>;

    async fn get_poem(&self, poem_id: Uuid) -> PortResult<Poem>;

    /// Active poems matching the filter, newest first.
    async fn list_poems(&self, filter: &PoemFilter, page: PageRequest) -> PortResult<Page<Poem>>;

    async fn update_poem(&self, poem_id: Uuid, update: PoemUpdate) -> PortResult<Poem>;

    /// Stores the derived statistics of a poem.
    async fn set_poem_stats(
        &self,
        poem_id: Uuid,
        read_count: u32,
        average_score: Option<f64>,
    ) -> PortResult<()>;

    // --- Readings ---

    async fn create_reading(&self, new_reading: NewReading) -> PortResult<Reading>;

    async fn get_reading(&self, reading_id: Uuid) -> PortResult<Reading>;

    async fn update_reading(&self, reading_id: Uuid, update: ReadingUpdate) -> PortResult<Reading>;

    /// A user's readings, newest first.
    async fn list_readings(
        &self,
        user_id: Uuid,
        filter: &ReadingFilter,
        page: PageRequest,
    ) -> PortResult<Page<Reading>>;

    /// Completed readings of a user created inside `range`, oldest first.
    async fn completed_readings(&self, user_id: Uuid, range: TimeRange)
        -> PortResult<Vec<Reading>>;

    /// All completed readings of a poem, across users.
    async fn completed_readings_for_poem(&self, poem_id: Uuid) -> PortResult<Vec<Reading>>;

    /// The most recent completed reading of the same poem created strictly before `before`.
    async fn previous_completed_reading(
        &self,
        user_id: Uuid,
        poem_id: Uuid,
        before: DateTime<Utc>,
    ) -> PortResult<Option<Reading>>;

    // --- Weekly Progress ---

    /// Returns the record for (user, week_start), inserting a zeroed one if absent.
    async fn get_or_create_progress(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<Progress>;

    async fn find_progress(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<Option<Progress>>;

    /// Upserts computed stats on the unique (user_id, week_start) key.
    ///
    /// Never writes `weekly_goal`; `goal_achieved` is evaluated against the
    /// goal stored at write time, not the one carried by `progress`.
    async fn save_weekly_stats(&self, progress: &Progress) -> PortResult<Progress>;

    /// Sets the goal of one week alone, re-evaluating attainment against the
    /// stored reading count. Creates the week if absent.
    async fn set_weekly_goal(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
        goal: u32,
    ) -> PortResult<Progress>;

    /// Records whose week_start falls inside `range`, newest first.
    async fn list_progress(&self, user_id: Uuid, range: TimeRange) -> PortResult<Vec<Progress>>;

    // --- Favorites ---

    async fn find_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<Option<Favorite>>;

    /// Fails with `PortError::Conflict` when the pair already exists.
    async fn add_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<Favorite>;

    /// Returns whether a record was removed.
    async fn remove_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<bool>;

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> PortResult<Page<FavoritePoem>>;
}
