//! services/api/src/services/progress.rs
//!
//! Persists the weekly aggregates computed in the core crate. Every refresh
//! recomputes from the stored readings, so calling it twice is harmless.

use chrono::{Duration, Utc};
use reading_practice_core::domain::{
    PageRequest, Progress, Reading, StudentFilter, TimeRange, User,
};
use reading_practice_core::ports::{DatabaseService, PortResult};
use reading_practice_core::progress::{
    apply_weekly_stats, average_score, month_range, round2, summarize_month,
    MonthlySummary, WeekWindow, WeeklyStats,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Longest history a single request may ask for.
pub const MAX_HISTORY_WEEKS: u32 = 52;

#[derive(Debug, Clone)]
pub struct StudentWeek {
    pub student: User,
    pub progress: Progress,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassTotals {
    pub students: u32,
    /// Students with at least one completed reading this week.
    pub active_students: u32,
    pub total_readings: u32,
    /// Mean of the active students' weekly averages.
    pub average_score: f64,
    pub goals_achieved: u32,
}

#[derive(Debug, Clone)]
pub struct ClassOverview {
    pub class_id: Option<String>,
    pub week: WeekWindow,
    pub students: Vec<StudentWeek>,
    pub totals: ClassTotals,
}

#[derive(Clone)]
pub struct ProgressTracker {
    db: Arc<dyn DatabaseService>,
}

impl ProgressTracker {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Rebuilds the stored record of `window` from the user's completed readings.
    #[instrument(skip(self), fields(week_start = %window.start))]
    pub async fn refresh_week(&self, user_id: Uuid, window: WeekWindow) -> PortResult<Progress> {
        let readings = self.db.completed_readings(user_id, window.range()).await?;
        let stats = WeeklyStats::from_readings(&readings, &window);
        let previous = self
            .db
            .find_progress(user_id, window.previous().start)
            .await?;

        let mut record = self.db.get_or_create_progress(user_id, window.start).await?;
        apply_weekly_stats(&mut record, &stats, previous.as_ref(), Utc::now());
        debug!(
            readings = record.readings_completed,
            average = record.average_score,
            "Weekly progress recomputed"
        );
        self.db.save_weekly_stats(&record).await
    }

    pub async fn refresh_current_week(&self, user_id: Uuid) -> PortResult<Progress> {
        self.refresh_week(user_id, WeekWindow::current()).await
    }

    /// Brings the week of `reading` and the poem's statistics up to date.
    pub async fn record_completion(&self, reading: &Reading) -> PortResult<Progress> {
        self.refresh_poem_stats(reading.poem_id).await?;
        self.refresh_week(reading.user_id, WeekWindow::containing(reading.created_at))
            .await
    }

    /// Recounts completed readings of a poem and their mean score.
    pub async fn refresh_poem_stats(&self, poem_id: Uuid) -> PortResult<()> {
        let readings = self.db.completed_readings_for_poem(poem_id).await?;
        let count = u32::try_from(readings.len()).unwrap_or(u32::MAX);
        self.db
            .set_poem_stats(poem_id, count, average_score(&readings))
            .await
    }

    /// The last `weeks` weekly records, newest first. The current week is refreshed first.
    pub async fn history(&self, user_id: Uuid, weeks: u32) -> PortResult<Vec<Progress>> {
        let weeks = weeks.clamp(1, MAX_HISTORY_WEEKS);
        let current = WeekWindow::current();
        self.refresh_week(user_id, current).await?;

        let from = current.start - Duration::weeks(i64::from(weeks - 1));
        self.db
            .list_progress(
                user_id,
                TimeRange {
                    from: Some(from),
                    until: None,
                },
            )
            .await
    }

    /// Weeks starting inside the month. `None` for an impossible month.
    pub async fn monthly(
        &self,
        user_id: Uuid,
        year: i32,
        month: u32,
    ) -> PortResult<Option<MonthlySummary>> {
        let Some(range) = month_range(year, month) else {
            return Ok(None);
        };
        if range.contains(WeekWindow::current().start) {
            self.refresh_current_week(user_id).await?;
        }
        let weeks = self.db.list_progress(user_id, range).await?;
        Ok(Some(summarize_month(weeks)))
    }

    /// Sets the goal on the current week and re-evaluates attainment.
    pub async fn set_weekly_goal(&self, user_id: Uuid, goal: u32) -> PortResult<Progress> {
        let week = WeekWindow::current();
        self.refresh_week(user_id, week).await?;
        self.db.set_weekly_goal(user_id, week.start, goal).await
    }

    /// Current-week progress of every active student in `class_id` (all students when `None`).
    #[instrument(skip(self))]
    pub async fn class_overview(&self, class_id: Option<String>) -> PortResult<ClassOverview> {
        let filter = StudentFilter {
            class_id: class_id.clone(),
            ..Default::default()
        };
        let mut roster = Vec::new();
        let mut request = PageRequest::new(1, PageRequest::MAX_LIMIT);
        loop {
            let page = self.db.list_students(&filter, request).await?;
            let has_next = page.has_next();
            roster.extend(page.items);
            if !has_next {
                break;
            }
            request = PageRequest::new(request.page + 1, request.limit);
        }

        let week = WeekWindow::current();
        let mut students = Vec::with_capacity(roster.len());
        for student in roster {
            let progress = self.refresh_week(student.id, week).await?;
            students.push(StudentWeek { student, progress });
        }

        let totals = class_totals(&students);
        Ok(ClassOverview {
            class_id,
            week,
            students,
            totals,
        })
    }
}

fn class_totals(students: &[StudentWeek]) -> ClassTotals {
    let mut totals = ClassTotals {
        students: u32::try_from(students.len()).unwrap_or(u32::MAX),
        ..Default::default()
    };
    let mut score_sum = 0.0;
    for entry in students {
        let p = &entry.progress;
        totals.total_readings += p.readings_completed;
        totals.goals_achieved += u32::from(p.goal_achieved);
        if p.readings_completed > 0 {
            totals.active_students += 1;
            score_sum += p.average_score;
        }
    }
    if totals.active_students > 0 {
        totals.average_score = round2(score_sum / f64::from(totals.active_students));
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDatabase;
    use chrono::DateTime;
    use reading_practice_core::domain::{
        Difficulty, Level, NewPoem, NewUser, Role,
    };

    struct Fixture {
        db: InMemoryDatabase,
        tracker: ProgressTracker,
    }

    fn fixture() -> Fixture {
        let db = InMemoryDatabase::new();
        let tracker = ProgressTracker::new(Arc::new(db.clone()));
        Fixture { db, tracker }
    }

    fn reading(user_id: Uuid, poem_id: Uuid, score: f64, at: DateTime<Utc>) -> Reading {
        Reading {
            id: Uuid::new_v4(),
            user_id,
            poem_id,
            score,
            duration_seconds: 90,
            completed: true,
            recording_url: None,
            feedback: None,
            mistakes: Vec::new(),
            session: None,
            created_at: at,
            updated_at: at,
        }
    }

    async fn student(db: &InMemoryDatabase, email: &str, class_id: &str) -> User {
        db.create_user(NewUser {
            email: email.into(),
            hashed_password: "hash".into(),
            name: "Student".into(),
            role: Role::Student,
            level: Level::Beginner,
            class_id: Some(class_id.into()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn week_with_two_readings_aggregates_scores() {
        let f = fixture();
        let user = Uuid::new_v4();
        let week = WeekWindow::current();
        f.db.insert_reading(reading(user, Uuid::new_v4(), 80.0, week.start + Duration::hours(1)));
        f.db.insert_reading(reading(user, Uuid::new_v4(), 90.0, week.start + Duration::hours(2)));

        let progress = f.tracker.refresh_week(user, week).await.unwrap();
        assert_eq!(progress.readings_completed, 2);
        assert_eq!(progress.average_score, 85.0);
        assert_eq!(progress.best_score, 90.0);
        assert_eq!(progress.worst_score, 80.0);
        assert_eq!(progress.total_time_minutes, 3.0);
        assert_eq!(progress.improvement_percentage, 0.0);
    }

    #[tokio::test]
    async fn refreshing_twice_is_idempotent() {
        let f = fixture();
        let user = Uuid::new_v4();
        let week = WeekWindow::current();
        f.db.insert_reading(reading(user, Uuid::new_v4(), 70.0, week.start));

        let first = f.tracker.refresh_week(user, week).await.unwrap();
        let second = f.tracker.refresh_week(user, week).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.readings_completed, second.readings_completed);
        assert_eq!(first.average_score, second.average_score);
        assert_eq!(first.streak_days, second.streak_days);
        assert_eq!(first.improvement_percentage, second.improvement_percentage);
    }

    #[tokio::test]
    async fn improvement_is_measured_against_previous_week() {
        let f = fixture();
        let user = Uuid::new_v4();
        let week = WeekWindow::current();
        let last = week.previous();
        f.db.insert_reading(reading(user, Uuid::new_v4(), 60.0, last.start + Duration::days(1)));
        f.db.insert_reading(reading(user, Uuid::new_v4(), 75.0, week.start + Duration::minutes(5)));

        f.tracker.refresh_week(user, last).await.unwrap();
        let current = f.tracker.refresh_week(user, week).await.unwrap();
        assert_eq!(current.improvement_percentage, 25.0);
    }

    #[tokio::test]
    async fn goal_survives_recomputation() {
        let f = fixture();
        let user = Uuid::new_v4();
        let week = WeekWindow::current();

        let with_goal = f.tracker.set_weekly_goal(user, 1).await.unwrap();
        assert_eq!(with_goal.weekly_goal, Some(1));
        assert!(!with_goal.goal_achieved);

        f.db.insert_reading(reading(user, Uuid::new_v4(), 88.0, week.start));
        let refreshed = f.tracker.refresh_current_week(user).await.unwrap();
        assert_eq!(refreshed.weekly_goal, Some(1));
        assert!(refreshed.goal_achieved);
    }

    #[tokio::test]
    async fn refresh_racing_a_goal_change_keeps_the_new_goal() {
        let f = fixture();
        let user = Uuid::new_v4();
        let week = WeekWindow::current();
        f.tracker.set_weekly_goal(user, 2).await.unwrap();
        f.db.insert_reading(reading(user, Uuid::new_v4(), 80.0, week.start));
        f.db.insert_reading(reading(user, Uuid::new_v4(), 90.0, week.start + Duration::hours(1)));

        // The refresh reads the week before the goal moves to 10.
        let mut stale = f.db.get_or_create_progress(user, week.start).await.unwrap();
        f.tracker.set_weekly_goal(user, 10).await.unwrap();
        let readings = f.db.completed_readings(user, week.range()).await.unwrap();
        let stats = WeeklyStats::from_readings(&readings, &week);
        apply_weekly_stats(&mut stale, &stats, None, Utc::now());
        assert!(stale.goal_achieved);
        let saved = f.db.save_weekly_stats(&stale).await.unwrap();

        assert_eq!(saved.weekly_goal, Some(10));
        assert_eq!(saved.readings_completed, 2);
        assert!(!saved.goal_achieved);
    }

    #[tokio::test]
    async fn history_is_bounded_and_newest_first() {
        let f = fixture();
        let user = Uuid::new_v4();
        let week = WeekWindow::current();
        let mut window = week;
        for _ in 0..5 {
            window = window.previous();
            f.db.insert_reading(reading(user, Uuid::new_v4(), 50.0, window.start));
            f.tracker.refresh_week(user, window).await.unwrap();
        }

        let history = f.tracker.history(user, 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].week_start, week.start);
        assert!(history.windows(2).all(|w| w[0].week_start > w[1].week_start));
    }

    #[tokio::test]
    async fn impossible_month_is_none() {
        let f = fixture();
        assert!(f.tracker.monthly(Uuid::new_v4(), 2024, 13).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completion_updates_poem_statistics() {
        let f = fixture();
        let poem = f
            .db
            .create_poem(NewPoem {
                title: "Le Corbeau et le Renard".into(),
                author: "Jean de La Fontaine".into(),
                content: "Maître Corbeau, sur un arbre perché".into(),
                theme: "fables".into(),
                level: Level::Intermediate,
                difficulty: Difficulty::Medium,
                duration_minutes: 3,
                description: None,
                tags: vec![],
                created_by: Uuid::new_v4(),
            })
            .await
            .unwrap();
        let user = Uuid::new_v4();
        let now = Utc::now();
        f.db.insert_reading(reading(user, poem.id, 70.0, now - Duration::minutes(2)));
        let latest = reading(user, poem.id, 95.0, now);
        f.db.insert_reading(latest.clone());

        f.tracker.record_completion(&latest).await.unwrap();
        let poem = f.db.get_poem(poem.id).await.unwrap();
        assert_eq!(poem.read_count, 2);
        assert_eq!(poem.average_score, Some(82.5));
    }

    #[tokio::test]
    async fn class_overview_counts_only_the_class() {
        let f = fixture();
        let emma = student(&f.db, "emma@school.test", "CM2-A").await;
        student(&f.db, "lucas@school.test", "CM2-A").await;
        student(&f.db, "other@school.test", "CM2-B").await;
        f.db.insert_reading(reading(
            emma.id,
            Uuid::new_v4(),
            80.0,
            WeekWindow::current().start,
        ));

        let overview = f
            .tracker
            .class_overview(Some("CM2-A".into()))
            .await
            .unwrap();
        assert_eq!(overview.totals.students, 2);
        assert_eq!(overview.totals.active_students, 1);
        assert_eq!(overview.totals.total_readings, 1);
        assert_eq!(overview.totals.average_score, 80.0);
    }
}
