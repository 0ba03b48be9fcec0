//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_practice_core::domain::{
    Favorite, FavoritePoem, Mistake, NewPoem, NewReading, NewUser, Page, PageRequest, Poem,
    PoemFilter, PoemUpdate, Progress, Reading, ReadingFilter, ReadingUpdate, SessionData,
    StudentFilter, TimeRange, User, UserCredentials, UserUpdate,
};
use reading_practice_core::ports::{DatabaseService, PortError, PortResult};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Error Mapping Helpers
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            PortError::Conflict(db.message().to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

fn parse_column<T: FromStr>(column: &str, raw: &str) -> PortResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("Corrupt column '{}': {}", column, e)))
}

fn to_u32(column: &str, value: i32) -> PortResult<u32> {
    u32::try_from(value)
        .map_err(|_| PortError::Unexpected(format!("Negative value in column '{}'", column)))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn like_pattern(term: &Option<String>) -> Option<String> {
    term.as_ref().map(|t| format!("%{}%", t.trim()))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, email, password_hash, name, role, level, class_id, avatar, \
     is_active, last_login, created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    level: String,
    class_id: Option<String>,
    avatar: Option<String>,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_credentials(self) -> PortResult<UserCredentials> {
        let user = User {
            id: self.id,
            email: self.email,
            name: self.name,
            role: parse_column("role", &self.role)?,
            level: parse_column("level", &self.level)?,
            class_id: self.class_id,
            avatar: self.avatar,
            is_active: self.is_active,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        Ok(UserCredentials {
            user,
            hashed_password: self.password_hash,
        })
    }

    fn to_domain(self) -> PortResult<User> {
        self.to_credentials().map(|c| c.user)
    }
}

const POEM_COLUMNS: &str = "id, title, author, content, theme, level, difficulty, \
     duration_minutes, description, tags, is_active, created_by, read_count, average_score, \
     created_at, updated_at";

#[derive(FromRow)]
struct PoemRecord {
    id: Uuid,
    title: String,
    author: String,
    content: String,
    theme: String,
    level: String,
    difficulty: String,
    duration_minutes: i32,
    description: Option<String>,
    tags: Vec<String>,
    is_active: bool,
    created_by: Uuid,
    read_count: i32,
    average_score: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl PoemRecord {
    fn to_domain(self) -> PortResult<Poem> {
        Ok(Poem {
            id: self.id,
            title: self.title,
            author: self.author,
            content: self.content,
            theme: self.theme,
            level: parse_column("level", &self.level)?,
            difficulty: parse_column("difficulty", &self.difficulty)?,
            duration_minutes: to_u32("duration_minutes", self.duration_minutes)?,
            description: self.description,
            tags: self.tags,
            is_active: self.is_active,
            created_by: self.created_by,
            read_count: to_u32("read_count", self.read_count)?,
            average_score: self.average_score,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// JSONB shape of one mistake.
#[derive(Serialize, Deserialize)]
struct MistakeJson {
    word: String,
    position: u32,
    #[serde(rename = "type")]
    kind: String,
    severity: String,
}

impl MistakeJson {
    fn from_domain(m: &Mistake) -> Self {
        Self {
            word: m.word.clone(),
            position: m.position,
            kind: m.kind.as_str().to_string(),
            severity: m.severity.as_str().to_string(),
        }
    }

    fn to_domain(self) -> PortResult<Mistake> {
        Ok(Mistake {
            word: self.word,
            position: self.position,
            kind: parse_column("mistakes.type", &self.kind)?,
            severity: parse_column("mistakes.severity", &self.severity)?,
        })
    }
}

/// JSONB shape of the session timing block.
#[derive(Serialize, Deserialize)]
struct SessionJson {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    pause_count: u32,
    total_pause_seconds: u32,
}

impl SessionJson {
    fn from_domain(s: &SessionData) -> Self {
        Self {
            start_time: s.start_time,
            end_time: s.end_time,
            pause_count: s.pause_count,
            total_pause_seconds: s.total_pause_seconds,
        }
    }

    fn to_domain(self) -> SessionData {
        SessionData {
            start_time: self.start_time,
            end_time: self.end_time,
            pause_count: self.pause_count,
            total_pause_seconds: self.total_pause_seconds,
        }
    }
}

fn mistakes_json(mistakes: &[Mistake]) -> Json<Vec<MistakeJson>> {
    Json(mistakes.iter().map(MistakeJson::from_domain).collect())
}

const READING_COLUMNS: &str = "id, user_id, poem_id, score, duration_seconds, completed, \
     recording_url, feedback, mistakes, session_data, created_at, updated_at";

#[derive(FromRow)]
struct ReadingRecord {
    id: Uuid,
    user_id: Uuid,
    poem_id: Uuid,
    score: f64,
    duration_seconds: i32,
    completed: bool,
    recording_url: Option<String>,
    feedback: Option<String>,
    mistakes: Json<Vec<MistakeJson>>,
    session_data: Option<Json<SessionJson>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ReadingRecord {
    fn to_domain(self) -> PortResult<Reading> {
        Ok(Reading {
            id: self.id,
            user_id: self.user_id,
            poem_id: self.poem_id,
            score: self.score,
            duration_seconds: to_u32("duration_seconds", self.duration_seconds)?,
            completed: self.completed,
            recording_url: self.recording_url,
            feedback: self.feedback,
            mistakes: self
                .mistakes
                .0
                .into_iter()
                .map(MistakeJson::to_domain)
                .collect::<PortResult<Vec<_>>>()?,
            session: self.session_data.map(|s| s.0.to_domain()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const PROGRESS_COLUMNS: &str = "id, user_id, week_start, readings_completed, \
     total_time_minutes, average_score, improvement_percentage, weekly_goal, goal_achieved, \
     streak_days, best_score, worst_score, total_mistakes, created_at, updated_at";

#[derive(FromRow)]
struct ProgressRecord {
    id: Uuid,
    user_id: Uuid,
    week_start: DateTime<Utc>,
    readings_completed: i32,
    total_time_minutes: f64,
    average_score: f64,
    improvement_percentage: f64,
    weekly_goal: Option<i32>,
    goal_achieved: bool,
    streak_days: i32,
    best_score: f64,
    worst_score: f64,
    total_mistakes: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self) -> PortResult<Progress> {
        Ok(Progress {
            id: self.id,
            user_id: self.user_id,
            week_start: self.week_start,
            readings_completed: to_u32("readings_completed", self.readings_completed)?,
            total_time_minutes: self.total_time_minutes,
            average_score: self.average_score,
            improvement_percentage: self.improvement_percentage,
            weekly_goal: self
                .weekly_goal
                .map(|g| to_u32("weekly_goal", g))
                .transpose()?,
            goal_achieved: self.goal_achieved,
            streak_days: to_u32("streak_days", self.streak_days)?,
            best_score: self.best_score,
            worst_score: self.worst_score,
            total_mistakes: to_u32("total_mistakes", self.total_mistakes)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct FavoriteRecord {
    id: Uuid,
    user_id: Uuid,
    poem_id: Uuid,
    created_at: DateTime<Utc>,
}
impl FavoriteRecord {
    fn to_domain(self) -> Favorite {
        Favorite {
            id: self.id,
            user_id: self.user_id,
            poem_id: self.poem_id,
            created_at: self.created_at,
        }
    }
}

fn page_of<R, T>(
    records: Vec<R>,
    total: i64,
    request: PageRequest,
    convert: impl Fn(R) -> PortResult<T>,
) -> PortResult<Page<T>> {
    Ok(Page {
        items: records.into_iter().map(convert).collect::<PortResult<Vec<_>>>()?,
        request,
        total: u64::try_from(total).unwrap_or(0),
    })
}

fn limit_offset(request: PageRequest) -> (i64, i64) {
    (
        i64::from(request.limit),
        i64::try_from(request.offset()).unwrap_or(i64::MAX),
    )
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, name, role, level, class_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.email)
            .bind(&new_user.hashed_password)
            .bind(&new_user.name)
            .bind(new_user.role.as_str())
            .bind(new_user.level.as_str())
            .bind(&new_user.class_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match unexpected(e) {
                PortError::Conflict(_) => {
                    PortError::Conflict(format!("A user with email {} already exists", new_user.email))
                }
                other => other,
            })?;
        record.to_domain()
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?
            .to_credentials()
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                level = COALESCE($3, level), \
                class_id = COALESCE($4, class_id), \
                avatar = COALESCE($5, avatar), \
                is_active = COALESCE($6, is_active), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(update.name)
            .bind(update.level.map(|l| l.as_str()))
            .bind(update.class_id)
            .bind(update.avatar)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn list_students(
        &self,
        filter: &StudentFilter,
        page: PageRequest,
    ) -> PortResult<Page<User>> {
        const WHERE: &str = "WHERE role = 'student' \
             AND ($1::text IS NULL OR class_id = $1) \
             AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2) \
             AND ($3 OR is_active)";
        let search = like_pattern(&filter.search);
        let (limit, offset) = limit_offset(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM users {WHERE}"))
            .bind(&filter.class_id)
            .bind(&search)
            .bind(filter.include_inactive)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users {WHERE} ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        );
        let records = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(&filter.class_id)
            .bind(&search)
            .bind(filter.include_inactive)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        page_of(records, total, page, UserRecord::to_domain)
    }

    async fn create_poem(&self, new_poem: NewPoem) -> PortResult<Poem> {
        let sql = format!(
            "INSERT INTO poems (id, title, author, content, theme, level, difficulty, \
                duration_minutes, description, tags, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {POEM_COLUMNS}"
        );
        sqlx::query_as::<_, PoemRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_poem.title)
            .bind(&new_poem.author)
            .bind(&new_poem.content)
            .bind(&new_poem.theme)
            .bind(new_poem.level.as_str())
            .bind(new_poem.difficulty.as_str())
            .bind(to_i32(new_poem.duration_minutes))
            .bind(&new_poem.description)
            .bind(&new_poem.tags)
            .bind(new_poem.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn get_poem(&self, poem_id: Uuid) -> PortResult<Poem> {
        let sql = format!("SELECT {POEM_COLUMNS} FROM poems WHERE id = $1");
        sqlx::query_as::<_, PoemRecord>(&sql)
            .bind(poem_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Poem {} not found", poem_id)))?
            .to_domain()
    }

    async fn list_poems(&self, filter: &PoemFilter, page: PageRequest) -> PortResult<Page<Poem>> {
        const WHERE: &str = "WHERE is_active \
             AND ($1::text IS NULL OR level = $1) \
             AND ($2::text IS NULL OR difficulty = $2) \
             AND ($3::text IS NULL OR theme ILIKE $3) \
             AND ($4::text IS NULL OR title ILIKE $4 OR author ILIKE $4 OR content ILIKE $4)";
        let level = filter.level.map(|l| l.as_str());
        let difficulty = filter.difficulty.map(|d| d.as_str());
        let search = like_pattern(&filter.search);
        let (limit, offset) = limit_offset(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM poems {WHERE}"))
            .bind(level)
            .bind(difficulty)
            .bind(&filter.theme)
            .bind(&search)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let sql = format!(
            "SELECT {POEM_COLUMNS} FROM poems {WHERE} ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        );
        let records = sqlx::query_as::<_, PoemRecord>(&sql)
            .bind(level)
            .bind(difficulty)
            .bind(&filter.theme)
            .bind(&search)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        page_of(records, total, page, PoemRecord::to_domain)
    }

    async fn update_poem(&self, poem_id: Uuid, update: PoemUpdate) -> PortResult<Poem> {
        let sql = format!(
            "UPDATE poems SET \
                title = COALESCE($2, title), \
                author = COALESCE($3, author), \
                content = COALESCE($4, content), \
                theme = COALESCE($5, theme), \
                level = COALESCE($6, level), \
                difficulty = COALESCE($7, difficulty), \
                duration_minutes = COALESCE($8, duration_minutes), \
                description = COALESCE($9, description), \
                tags = COALESCE($10, tags), \
                is_active = COALESCE($11, is_active), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {POEM_COLUMNS}"
        );
        sqlx::query_as::<_, PoemRecord>(&sql)
            .bind(poem_id)
            .bind(update.title)
            .bind(update.author)
            .bind(update.content)
            .bind(update.theme)
            .bind(update.level.map(|l| l.as_str()))
            .bind(update.difficulty.map(|d| d.as_str()))
            .bind(update.duration_minutes.map(to_i32))
            .bind(update.description)
            .bind(update.tags)
            .bind(update.is_active)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Poem {} not found", poem_id)))?
            .to_domain()
    }

    async fn set_poem_stats(
        &self,
        poem_id: Uuid,
        read_count: u32,
        average_score: Option<f64>,
    ) -> PortResult<()> {
        sqlx::query(
            "UPDATE poems SET read_count = $2, average_score = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(poem_id)
        .bind(to_i32(read_count))
        .bind(average_score)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn create_reading(&self, new_reading: NewReading) -> PortResult<Reading> {
        let sql = format!(
            "INSERT INTO readings (id, user_id, poem_id, score, duration_seconds, completed, \
                feedback, mistakes, session_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {READING_COLUMNS}"
        );
        sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_reading.user_id)
            .bind(new_reading.poem_id)
            .bind(new_reading.score)
            .bind(to_i32(new_reading.duration_seconds))
            .bind(new_reading.completed)
            .bind(&new_reading.feedback)
            .bind(mistakes_json(&new_reading.mistakes))
            .bind(new_reading.session.as_ref().map(|s| Json(SessionJson::from_domain(s))))
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn get_reading(&self, reading_id: Uuid) -> PortResult<Reading> {
        let sql = format!("SELECT {READING_COLUMNS} FROM readings WHERE id = $1");
        sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(reading_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Reading {} not found", reading_id)))?
            .to_domain()
    }

    async fn update_reading(&self, reading_id: Uuid, update: ReadingUpdate) -> PortResult<Reading> {
        let sql = format!(
            "UPDATE readings SET \
                score = COALESCE($2, score), \
                duration_seconds = COALESCE($3, duration_seconds), \
                completed = COALESCE($4, completed), \
                feedback = COALESCE($5, feedback), \
                recording_url = COALESCE($6, recording_url), \
                mistakes = COALESCE($7, mistakes), \
                session_data = COALESCE($8, session_data), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {READING_COLUMNS}"
        );
        sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(reading_id)
            .bind(update.score)
            .bind(update.duration_seconds.map(to_i32))
            .bind(update.completed)
            .bind(update.feedback)
            .bind(update.recording_url)
            .bind(update.mistakes.as_deref().map(mistakes_json))
            .bind(update.session.as_ref().map(|s| Json(SessionJson::from_domain(s))))
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Reading {} not found", reading_id)))?
            .to_domain()
    }

    async fn list_readings(
        &self,
        user_id: Uuid,
        filter: &ReadingFilter,
        page: PageRequest,
    ) -> PortResult<Page<Reading>> {
        const WHERE: &str = "WHERE user_id = $1 \
             AND ($2::uuid IS NULL OR poem_id = $2) \
             AND ($3::boolean IS NULL OR completed = $3)";
        let (limit, offset) = limit_offset(page);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM readings {WHERE}"))
            .bind(user_id)
            .bind(filter.poem_id)
            .bind(filter.completed)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings {WHERE} \
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        );
        let records = sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(user_id)
            .bind(filter.poem_id)
            .bind(filter.completed)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        page_of(records, total, page, ReadingRecord::to_domain)
    }

    async fn completed_readings(
        &self,
        user_id: Uuid,
        range: TimeRange,
    ) -> PortResult<Vec<Reading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE user_id = $1 AND completed \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND ($3::timestamptz IS NULL OR created_at < $3) \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(user_id)
            .bind(range.from)
            .bind(range.until)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(ReadingRecord::to_domain)
            .collect()
    }

    async fn completed_readings_for_poem(&self, poem_id: Uuid) -> PortResult<Vec<Reading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE poem_id = $1 AND completed \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(poem_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(ReadingRecord::to_domain)
            .collect()
    }

    async fn previous_completed_reading(
        &self,
        user_id: Uuid,
        poem_id: Uuid,
        before: DateTime<Utc>,
    ) -> PortResult<Option<Reading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings \
             WHERE user_id = $1 AND poem_id = $2 AND completed AND created_at < $3 \
             ORDER BY created_at DESC LIMIT 1"
        );
        sqlx::query_as::<_, ReadingRecord>(&sql)
            .bind(user_id)
            .bind(poem_id)
            .bind(before)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(ReadingRecord::to_domain)
            .transpose()
    }

    async fn get_or_create_progress(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<Progress> {
        // A concurrent insert for the same week simply loses the race here.
        sqlx::query(
            "INSERT INTO progress (id, user_id, week_start) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, week_start) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(week_start)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        self.find_progress(user_id, week_start).await?.ok_or_else(|| {
            PortError::Unexpected(format!("Progress for {} vanished after upsert", user_id))
        })
    }

    async fn find_progress(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<Option<Progress>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE user_id = $1 AND week_start = $2"
        );
        sqlx::query_as::<_, ProgressRecord>(&sql)
            .bind(user_id)
            .bind(week_start)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(ProgressRecord::to_domain)
            .transpose()
    }

    async fn save_weekly_stats(&self, progress: &Progress) -> PortResult<Progress> {
        // weekly_goal is owned by set_weekly_goal; attainment is judged against the stored goal.
        let sql = format!(
            "INSERT INTO progress ({PROGRESS_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, FALSE, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (user_id, week_start) DO UPDATE SET \
                readings_completed = EXCLUDED.readings_completed, \
                total_time_minutes = EXCLUDED.total_time_minutes, \
                average_score = EXCLUDED.average_score, \
                improvement_percentage = EXCLUDED.improvement_percentage, \
                goal_achieved = (progress.weekly_goal IS NOT NULL \
                    AND EXCLUDED.readings_completed >= progress.weekly_goal), \
                streak_days = EXCLUDED.streak_days, \
                best_score = EXCLUDED.best_score, \
                worst_score = EXCLUDED.worst_score, \
                total_mistakes = EXCLUDED.total_mistakes, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {PROGRESS_COLUMNS}"
        );
        sqlx::query_as::<_, ProgressRecord>(&sql)
            .bind(progress.id)
            .bind(progress.user_id)
            .bind(progress.week_start)
            .bind(to_i32(progress.readings_completed))
            .bind(progress.total_time_minutes)
            .bind(progress.average_score)
            .bind(progress.improvement_percentage)
            .bind(to_i32(progress.streak_days))
            .bind(progress.best_score)
            .bind(progress.worst_score)
            .bind(to_i32(progress.total_mistakes))
            .bind(progress.created_at)
            .bind(progress.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn set_weekly_goal(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
        goal: u32,
    ) -> PortResult<Progress> {
        let sql = format!(
            "INSERT INTO progress (id, user_id, week_start, weekly_goal, goal_achieved, updated_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5) \
             ON CONFLICT (user_id, week_start) DO UPDATE SET \
                weekly_goal = EXCLUDED.weekly_goal, \
                goal_achieved = progress.readings_completed >= EXCLUDED.weekly_goal, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {PROGRESS_COLUMNS}"
        );
        sqlx::query_as::<_, ProgressRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(week_start)
            .bind(to_i32(goal))
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?
            .to_domain()
    }

    async fn list_progress(&self, user_id: Uuid, range: TimeRange) -> PortResult<Vec<Progress>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress \
             WHERE user_id = $1 \
               AND ($2::timestamptz IS NULL OR week_start >= $2) \
               AND ($3::timestamptz IS NULL OR week_start < $3) \
             ORDER BY week_start DESC"
        );
        sqlx::query_as::<_, ProgressRecord>(&sql)
            .bind(user_id)
            .bind(range.from)
            .bind(range.until)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(ProgressRecord::to_domain)
            .collect()
    }

    async fn find_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<Option<Favorite>> {
        let record = sqlx::query_as::<_, FavoriteRecord>(
            "SELECT id, user_id, poem_id, created_at FROM favorites \
             WHERE user_id = $1 AND poem_id = $2",
        )
        .bind(user_id)
        .bind(poem_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(FavoriteRecord::to_domain))
    }

    async fn add_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<Favorite> {
        let record = sqlx::query_as::<_, FavoriteRecord>(
            "INSERT INTO favorites (id, user_id, poem_id) VALUES ($1, $2, $3) \
             RETURNING id, user_id, poem_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(poem_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn remove_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND poem_id = $2")
            .bind(user_id)
            .bind(poem_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> PortResult<Page<FavoritePoem>> {
        let (limit, offset) = limit_offset(page);
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let favorites = sqlx::query_as::<_, FavoriteRecord>(
            "SELECT id, user_id, poem_id, created_at FROM favorites WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let poem_ids: Vec<Uuid> = favorites.iter().map(|f| f.poem_id).collect();
        let sql = format!("SELECT {POEM_COLUMNS} FROM poems WHERE id = ANY($1)");
        let mut poems: HashMap<Uuid, Poem> = sqlx::query_as::<_, PoemRecord>(&sql)
            .bind(&poem_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(|r| r.to_domain().map(|p| (p.id, p)))
            .collect::<PortResult<_>>()?;

        let items = favorites
            .into_iter()
            .filter_map(|f| {
                let poem = poems.remove(&f.poem_id)?;
                Some(FavoritePoem {
                    favorite: f.to_domain(),
                    poem,
                })
            })
            .collect();

        Ok(Page {
            items,
            request: page,
            total: u64::try_from(total).unwrap_or(0),
        })
    }
}
