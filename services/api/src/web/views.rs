//! services/api/src/web/views.rs
//!
//! JSON shapes of the domain records. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use reading_practice_core::domain::{
    FavoritePoem, Mistake, MistakeKind, Poem, Progress, Reading, SessionData, Severity, User,
};
use reading_practice_core::progress::{MonthlySummary, MonthlyTotals, ReadingStats, WeekWindow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::{ClassOverview, ClassTotals, StudentWeek};

/// A user as returned by the API. Password material never reaches this type.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub level: String,
    pub class_id: Option<String>,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.as_str().to_string(),
            level: user.level.as_str().to_string(),
            class_id: user.class_id.clone(),
            avatar: user.avatar.clone(),
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoemView {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub content: String,
    pub theme: String,
    pub level: String,
    pub difficulty: String,
    pub duration: u32,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub read_count: u32,
    pub average_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Poem> for PoemView {
    fn from(poem: Poem) -> Self {
        Self {
            id: poem.id,
            title: poem.title,
            author: poem.author,
            content: poem.content,
            theme: poem.theme,
            level: poem.level.as_str().to_string(),
            difficulty: poem.difficulty.as_str().to_string(),
            duration: poem.duration_minutes,
            description: poem.description,
            tags: poem.tags,
            is_active: poem.is_active,
            created_by: poem.created_by,
            read_count: poem.read_count,
            average_score: poem.average_score,
            created_at: poem.created_at,
            updated_at: poem.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MistakeView {
    pub word: String,
    pub position: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
}

impl From<&Mistake> for MistakeView {
    fn from(m: &Mistake) -> Self {
        Self {
            word: m.word.clone(),
            position: m.position,
            kind: m.kind.as_str().to_string(),
            severity: m.severity.as_str().to_string(),
        }
    }
}

/// Incoming mistake; enumerations are checked by the handler.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MistakeInput {
    pub word: String,
    pub position: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub severity: Option<String>,
}

impl MistakeInput {
    pub fn parse(&self) -> Option<Mistake> {
        Some(Mistake {
            word: self.word.trim().to_string(),
            position: u32::try_from(self.position).ok()?,
            kind: self.kind.parse::<MistakeKind>().ok()?,
            severity: match &self.severity {
                Some(s) => s.parse::<Severity>().ok()?,
                None => Severity::Medium,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pause_count: u32,
    #[serde(default)]
    pub total_pause_time: u32,
}

impl From<&SessionData> for SessionPayload {
    fn from(s: &SessionData) -> Self {
        Self {
            start_time: s.start_time,
            end_time: s.end_time,
            pause_count: s.pause_count,
            total_pause_time: s.total_pause_seconds,
        }
    }
}

impl From<SessionPayload> for SessionData {
    fn from(s: SessionPayload) -> Self {
        Self {
            start_time: s.start_time,
            end_time: s.end_time,
            pause_count: s.pause_count,
            total_pause_seconds: s.total_pause_time,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub poem_id: Uuid,
    pub score: f64,
    pub duration: u32,
    pub completed: bool,
    pub recording_url: Option<String>,
    pub feedback: Option<String>,
    pub mistakes: Vec<MistakeView>,
    pub session_data: Option<SessionPayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reading> for ReadingView {
    fn from(r: Reading) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            poem_id: r.poem_id,
            score: r.score,
            duration: r.duration_seconds,
            completed: r.completed,
            recording_url: r.recording_url,
            feedback: r.feedback,
            mistakes: r.mistakes.iter().map(MistakeView::from).collect(),
            session_data: r.session.as_ref().map(SessionPayload::from),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingStatsView {
    pub total_readings: u32,
    pub average_score: f64,
    pub total_time: f64,
    pub best_score: f64,
    pub worst_score: f64,
}

impl From<ReadingStats> for ReadingStatsView {
    fn from(s: ReadingStats) -> Self {
        Self {
            total_readings: s.total_readings,
            average_score: s.average_score,
            total_time: s.total_time_minutes,
            best_score: s.best_score,
            worst_score: s.worst_score,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub readings_completed: u32,
    pub total_time: f64,
    pub average_score: f64,
    pub improvement_percentage: f64,
    pub weekly_goal: Option<u32>,
    pub goal_achieved: bool,
    pub streak_days: u32,
    pub best_score: f64,
    pub worst_score: f64,
    pub total_mistakes: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<Progress> for ProgressView {
    fn from(p: Progress) -> Self {
        let window = WeekWindow::containing(p.week_start);
        Self {
            id: p.id,
            user_id: p.user_id,
            week_start: p.week_start,
            week_end: window.end,
            readings_completed: p.readings_completed,
            total_time: p.total_time_minutes,
            average_score: p.average_score,
            improvement_percentage: p.improvement_percentage,
            weekly_goal: p.weekly_goal,
            goal_achieved: p.goal_achieved,
            streak_days: p.streak_days,
            best_score: p.best_score,
            worst_score: p.worst_score,
            total_mistakes: p.total_mistakes,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTotalsView {
    pub total_readings: u32,
    pub total_time: f64,
    pub average_score: f64,
    pub goals_achieved: u32,
    pub total_mistakes: u32,
}

impl From<MonthlyTotals> for MonthlyTotalsView {
    fn from(t: MonthlyTotals) -> Self {
        Self {
            total_readings: t.total_readings,
            total_time: t.total_time_minutes,
            average_score: t.average_score,
            goals_achieved: t.goals_achieved,
            total_mistakes: t.total_mistakes,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyView {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<ProgressView>,
    pub totals: MonthlyTotalsView,
}

impl MonthlyView {
    pub fn new(year: i32, month: u32, summary: MonthlySummary) -> Self {
        Self {
            year,
            month,
            weeks: summary.weeks.into_iter().map(ProgressView::from).collect(),
            totals: summary.totals.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentWeekView {
    pub student: UserView,
    pub progress: ProgressView,
}

impl From<StudentWeek> for StudentWeekView {
    fn from(entry: StudentWeek) -> Self {
        Self {
            student: UserView::from(&entry.student),
            progress: entry.progress.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassTotalsView {
    pub students: u32,
    pub active_students: u32,
    pub total_readings: u32,
    pub average_score: f64,
    pub goals_achieved: u32,
}

impl From<ClassTotals> for ClassTotalsView {
    fn from(t: ClassTotals) -> Self {
        Self {
            students: t.students,
            active_students: t.active_students,
            total_readings: t.total_readings,
            average_score: t.average_score,
            goals_achieved: t.goals_achieved,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverviewView {
    pub class_id: Option<String>,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub students: Vec<StudentWeekView>,
    pub totals: ClassTotalsView,
}

impl From<ClassOverview> for ClassOverviewView {
    fn from(o: ClassOverview) -> Self {
        Self {
            class_id: o.class_id,
            week_start: o.week.start,
            week_end: o.week.end,
            students: o.students.into_iter().map(StudentWeekView::from).collect(),
            totals: o.totals.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteView {
    pub id: Uuid,
    pub poem: PoemView,
    pub created_at: DateTime<Utc>,
}

impl From<FavoritePoem> for FavoriteView {
    fn from(f: FavoritePoem) -> Self {
        Self {
            id: f.favorite.id,
            poem: f.poem.into(),
            created_at: f.favorite.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteStatus {
    pub poem_id: Uuid,
    pub is_favorite: bool,
}
