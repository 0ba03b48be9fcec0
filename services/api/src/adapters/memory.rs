//! services/api/src/adapters/memory.rs
//!
//! A process-local `DatabaseService` used by the test suites and for running the
//! API without PostgreSQL. Uniqueness rules mirror the SQL schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_practice_core::domain::{
    Favorite, FavoritePoem, NewPoem, NewReading, NewUser, Page, PageRequest, Poem, PoemFilter,
    PoemUpdate, Progress, Reading, ReadingFilter, ReadingUpdate, Role, StudentFilter, TimeRange,
    User, UserCredentials, UserUpdate,
};
use reading_practice_core::ports::{DatabaseService, PortError, PortResult};
use reading_practice_core::progress::goal_achieved;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserCredentials>,
    poems: HashMap<Uuid, Poem>,
    readings: HashMap<Uuid, Reading>,
    progress: HashMap<(Uuid, DateTime<Utc>), Progress>,
    favorites: HashMap<(Uuid, Uuid), Favorite>,
}

#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a reading as-is, keeping its timestamps.
    pub fn insert_reading(&self, reading: Reading) {
        self.lock().readings.insert(reading.id, reading);
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

fn newest_first<T>(mut items: Vec<T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut tables = self.lock();
        let email = new_user.email.to_lowercase();
        if tables
            .users
            .values()
            .any(|c| c.user.email.to_lowercase() == email)
        {
            return Err(PortError::Conflict(format!(
                "A user with email {} already exists",
                new_user.email
            )));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            role: new_user.role,
            level: new_user.level,
            class_id: new_user.class_id,
            avatar: None,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                hashed_password: new_user.hashed_password,
            },
        );
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        self.lock()
            .users
            .get(&user_id)
            .map(|c| c.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let email = email.to_lowercase();
        self.lock()
            .users
            .values()
            .find(|c| c.user.email.to_lowercase() == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let mut tables = self.lock();
        let credentials = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        let user = &mut credentials.user;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(level) = update.level {
            user.level = level;
        }
        if let Some(class_id) = update.class_id {
            user.class_id = Some(class_id);
        }
        if let Some(avatar) = update.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(is_active) = update.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn record_login(&self, user_id: Uuid, at: DateTime<Utc>) -> PortResult<()> {
        if let Some(credentials) = self.lock().users.get_mut(&user_id) {
            credentials.user.last_login = Some(at);
        }
        Ok(())
    }

    async fn list_students(
        &self,
        filter: &StudentFilter,
        page: PageRequest,
    ) -> PortResult<Page<User>> {
        let students: Vec<User> = self
            .lock()
            .users
            .values()
            .map(|c| &c.user)
            .filter(|u| u.role == Role::Student)
            .filter(|u| filter.include_inactive || u.is_active)
            .filter(|u| {
                filter
                    .class_id
                    .as_ref()
                    .map_or(true, |class| u.class_id.as_ref() == Some(class))
            })
            .filter(|u| {
                filter.search.as_ref().map_or(true, |term| {
                    contains_ci(&u.name, term) || contains_ci(&u.email, term)
                })
            })
            .cloned()
            .collect();
        Ok(Page::from_vec(newest_first(students, |u| u.created_at), page))
    }

    async fn create_poem(&self, new_poem: NewPoem) -> PortResult<Poem> {
        let now = Utc::now();
        let poem = Poem {
            id: Uuid::new_v4(),
            title: new_poem.title,
            author: new_poem.author,
            content: new_poem.content,
            theme: new_poem.theme,
            level: new_poem.level,
            difficulty: new_poem.difficulty,
            duration_minutes: new_poem.duration_minutes,
            description: new_poem.description,
            tags: new_poem.tags,
            is_active: true,
            created_by: new_poem.created_by,
            read_count: 0,
            average_score: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().poems.insert(poem.id, poem.clone());
        Ok(poem)
    }

    async fn get_poem(&self, poem_id: Uuid) -> PortResult<Poem> {
        self.lock()
            .poems
            .get(&poem_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Poem {} not found", poem_id)))
    }

    async fn list_poems(&self, filter: &PoemFilter, page: PageRequest) -> PortResult<Page<Poem>> {
        let poems: Vec<Poem> = self
            .lock()
            .poems
            .values()
            .filter(|p| p.is_active)
            .filter(|p| filter.level.map_or(true, |l| p.level == l))
            .filter(|p| filter.difficulty.map_or(true, |d| p.difficulty == d))
            .filter(|p| {
                filter
                    .theme
                    .as_ref()
                    .map_or(true, |t| p.theme.eq_ignore_ascii_case(t.trim()))
            })
            .filter(|p| {
                filter.search.as_ref().map_or(true, |term| {
                    contains_ci(&p.title, term)
                        || contains_ci(&p.author, term)
                        || contains_ci(&p.content, term)
                })
            })
            .cloned()
            .collect();
        Ok(Page::from_vec(newest_first(poems, |p| p.created_at), page))
    }

    async fn update_poem(&self, poem_id: Uuid, update: PoemUpdate) -> PortResult<Poem> {
        let mut tables = self.lock();
        let poem = tables
            .poems
            .get_mut(&poem_id)
            .ok_or_else(|| PortError::NotFound(format!("Poem {} not found", poem_id)))?;
        if let Some(v) = update.title {
            poem.title = v;
        }
        if let Some(v) = update.author {
            poem.author = v;
        }
        if let Some(v) = update.content {
            poem.content = v;
        }
        if let Some(v) = update.theme {
            poem.theme = v;
        }
        if let Some(v) = update.level {
            poem.level = v;
        }
        if let Some(v) = update.difficulty {
            poem.difficulty = v;
        }
        if let Some(v) = update.duration_minutes {
            poem.duration_minutes = v;
        }
        if let Some(v) = update.description {
            poem.description = Some(v);
        }
        if let Some(v) = update.tags {
            poem.tags = v;
        }
        if let Some(v) = update.is_active {
            poem.is_active = v;
        }
        poem.updated_at = Utc::now();
        Ok(poem.clone())
    }

    async fn set_poem_stats(
        &self,
        poem_id: Uuid,
        read_count: u32,
        average_score: Option<f64>,
    ) -> PortResult<()> {
        if let Some(poem) = self.lock().poems.get_mut(&poem_id) {
            poem.read_count = read_count;
            poem.average_score = average_score;
            poem.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_reading(&self, new_reading: NewReading) -> PortResult<Reading> {
        let now = Utc::now();
        let reading = Reading {
            id: Uuid::new_v4(),
            user_id: new_reading.user_id,
            poem_id: new_reading.poem_id,
            score: new_reading.score,
            duration_seconds: new_reading.duration_seconds,
            completed: new_reading.completed,
            recording_url: None,
            feedback: new_reading.feedback,
            mistakes: new_reading.mistakes,
            session: new_reading.session,
            created_at: now,
            updated_at: now,
        };
        self.lock().readings.insert(reading.id, reading.clone());
        Ok(reading)
    }

    async fn get_reading(&self, reading_id: Uuid) -> PortResult<Reading> {
        self.lock()
            .readings
            .get(&reading_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Reading {} not found", reading_id)))
    }

    async fn update_reading(&self, reading_id: Uuid, update: ReadingUpdate) -> PortResult<Reading> {
        let mut tables = self.lock();
        let reading = tables
            .readings
            .get_mut(&reading_id)
            .ok_or_else(|| PortError::NotFound(format!("Reading {} not found", reading_id)))?;
        if let Some(v) = update.score {
            reading.score = v;
        }
        if let Some(v) = update.duration_seconds {
            reading.duration_seconds = v;
        }
        if let Some(v) = update.completed {
            reading.completed = v;
        }
        if let Some(v) = update.feedback {
            reading.feedback = Some(v);
        }
        if let Some(v) = update.recording_url {
            reading.recording_url = Some(v);
        }
        if let Some(v) = update.mistakes {
            reading.mistakes = v;
        }
        if let Some(v) = update.session {
            reading.session = Some(v);
        }
        reading.updated_at = Utc::now();
        Ok(reading.clone())
    }

    async fn list_readings(
        &self,
        user_id: Uuid,
        filter: &ReadingFilter,
        page: PageRequest,
    ) -> PortResult<Page<Reading>> {
        let readings: Vec<Reading> = self
            .lock()
            .readings
            .values()
            .filter(|r| r.user_id == user_id)
            .filter(|r| filter.poem_id.map_or(true, |p| r.poem_id == p))
            .filter(|r| filter.completed.map_or(true, |c| r.completed == c))
            .cloned()
            .collect();
        Ok(Page::from_vec(newest_first(readings, |r| r.created_at), page))
    }

    async fn completed_readings(
        &self,
        user_id: Uuid,
        range: TimeRange,
    ) -> PortResult<Vec<Reading>> {
        let mut readings: Vec<Reading> = self
            .lock()
            .readings
            .values()
            .filter(|r| r.user_id == user_id && r.completed && range.contains(r.created_at))
            .cloned()
            .collect();
        readings.sort_by_key(|r| r.created_at);
        Ok(readings)
    }

    async fn completed_readings_for_poem(&self, poem_id: Uuid) -> PortResult<Vec<Reading>> {
        let mut readings: Vec<Reading> = self
            .lock()
            .readings
            .values()
            .filter(|r| r.poem_id == poem_id && r.completed)
            .cloned()
            .collect();
        readings.sort_by_key(|r| r.created_at);
        Ok(readings)
    }

    async fn previous_completed_reading(
        &self,
        user_id: Uuid,
        poem_id: Uuid,
        before: DateTime<Utc>,
    ) -> PortResult<Option<Reading>> {
        Ok(self
            .lock()
            .readings
            .values()
            .filter(|r| {
                r.user_id == user_id && r.poem_id == poem_id && r.completed && r.created_at < before
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn get_or_create_progress(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<Progress> {
        Ok(self
            .lock()
            .progress
            .entry((user_id, week_start))
            .or_insert_with(|| Progress::empty(user_id, week_start, Utc::now()))
            .clone())
    }

    async fn find_progress(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
    ) -> PortResult<Option<Progress>> {
        Ok(self.lock().progress.get(&(user_id, week_start)).cloned())
    }

    async fn save_weekly_stats(&self, progress: &Progress) -> PortResult<Progress> {
        let mut tables = self.lock();
        let key = (progress.user_id, progress.week_start);
        let saved = match tables.progress.get(&key) {
            Some(existing) => Progress {
                id: existing.id,
                created_at: existing.created_at,
                weekly_goal: existing.weekly_goal,
                goal_achieved: goal_achieved(progress.readings_completed, existing.weekly_goal),
                ..progress.clone()
            },
            None => Progress {
                weekly_goal: None,
                goal_achieved: false,
                ..progress.clone()
            },
        };
        tables.progress.insert(key, saved.clone());
        Ok(saved)
    }

    async fn set_weekly_goal(
        &self,
        user_id: Uuid,
        week_start: DateTime<Utc>,
        goal: u32,
    ) -> PortResult<Progress> {
        let now = Utc::now();
        let mut tables = self.lock();
        let record = tables
            .progress
            .entry((user_id, week_start))
            .or_insert_with(|| Progress::empty(user_id, week_start, now));
        record.weekly_goal = Some(goal);
        record.goal_achieved = goal_achieved(record.readings_completed, record.weekly_goal);
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn list_progress(&self, user_id: Uuid, range: TimeRange) -> PortResult<Vec<Progress>> {
        let records: Vec<Progress> = self
            .lock()
            .progress
            .values()
            .filter(|p| p.user_id == user_id && range.contains(p.week_start))
            .cloned()
            .collect();
        Ok(newest_first(records, |p| p.week_start))
    }

    async fn find_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<Option<Favorite>> {
        Ok(self.lock().favorites.get(&(user_id, poem_id)).cloned())
    }

    async fn add_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<Favorite> {
        let mut tables = self.lock();
        if tables.favorites.contains_key(&(user_id, poem_id)) {
            return Err(PortError::Conflict("Poem already in favorites".to_string()));
        }
        let favorite = Favorite {
            id: Uuid::new_v4(),
            user_id,
            poem_id,
            created_at: Utc::now(),
        };
        tables.favorites.insert((user_id, poem_id), favorite.clone());
        Ok(favorite)
    }

    async fn remove_favorite(&self, user_id: Uuid, poem_id: Uuid) -> PortResult<bool> {
        Ok(self.lock().favorites.remove(&(user_id, poem_id)).is_some())
    }

    async fn list_favorites(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> PortResult<Page<FavoritePoem>> {
        let tables = self.lock();
        let favorites: Vec<FavoritePoem> = tables
            .favorites
            .values()
            .filter(|f| f.user_id == user_id)
            .filter_map(|f| {
                tables.poems.get(&f.poem_id).map(|poem| FavoritePoem {
                    favorite: f.clone(),
                    poem: poem.clone(),
                })
            })
            .collect();
        Ok(Page::from_vec(
            newest_first(favorites, |f| f.favorite.created_at),
            page,
        ))
    }
}
