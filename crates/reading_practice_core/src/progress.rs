//! crates/reading_practice_core/src/progress.rs
//!
//! Weekly progress aggregation. Everything here is a pure function of the
//! readings handed in, so a `Progress` record can always be rebuilt by
//! replaying a user's completed readings.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeSet;

use crate::domain::{Progress, Reading, TimeRange};

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

//=========================================================================================
// Aggregate Window
//=========================================================================================

/// A 7-day bucket starting Sunday 00:00 UTC. `start` is inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WeekWindow {
    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    pub fn containing(instant: DateTime<Utc>) -> Self {
        let date = instant.date_naive();
        let back = i64::from(date.weekday().num_days_from_sunday());
        let start = Utc.from_utc_datetime(&(date - Duration::days(back)).and_time(NaiveTime::MIN));
        Self::starting_at(start)
    }

    fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: start + Duration::days(7),
        }
    }

    pub fn previous(&self) -> Self {
        Self::starting_at(self.start - Duration::days(7))
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::between(self.start, self.end)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.range().contains(instant)
    }
}

//=========================================================================================
// Weekly Statistics
//=========================================================================================

/// The recomputable part of a `Progress` record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklyStats {
    pub readings_completed: u32,
    pub total_time_minutes: f64,
    pub average_score: f64,
    pub best_score: f64,
    pub worst_score: f64,
    pub total_mistakes: u32,
    pub streak_days: u32,
}

impl WeeklyStats {
    /// Aggregates the completed readings that fall inside `window`.
    /// Anything else in `readings` is ignored; no readings gives zeroed stats.
    pub fn from_readings(readings: &[Reading], window: &WeekWindow) -> Self {
        let in_week: Vec<&Reading> = readings
            .iter()
            .filter(|r| r.completed && window.contains(r.created_at))
            .collect();

        let Some(summary) = ScoreSummary::of(in_week.iter().map(|r| r.score)) else {
            return Self::default();
        };

        let total_seconds: u64 = in_week.iter().map(|r| u64::from(r.duration_seconds)).sum();
        let total_mistakes = in_week.iter().map(|r| r.mistakes.len() as u32).sum();

        Self {
            readings_completed: summary.count,
            total_time_minutes: round2(total_seconds as f64 / 60.0),
            average_score: round2(summary.average),
            best_score: summary.best,
            worst_score: summary.worst,
            total_mistakes,
            streak_days: streak_days(in_week.iter().map(|r| r.created_at)),
        }
    }
}

/// Week-over-week change of the average score, in percent.
///
/// Returns 0 when there is no previous week or its average is 0.
pub fn improvement_percentage(current_average: f64, previous: Option<&Progress>) -> f64 {
    match previous {
        Some(prev) if prev.average_score > 0.0 => {
            round2((current_average - prev.average_score) / prev.average_score * 100.0)
        }
        _ => 0.0,
    }
}

pub fn goal_achieved(readings_completed: u32, weekly_goal: Option<u32>) -> bool {
    weekly_goal.is_some_and(|goal| readings_completed >= goal)
}

/// Consecutive active days ending at the most recent active day.
pub fn streak_days(activity: impl IntoIterator<Item = DateTime<Utc>>) -> u32 {
    let days: BTreeSet<NaiveDate> = activity.into_iter().map(|t| t.date_naive()).collect();
    let Some(&last) = days.iter().next_back() else {
        return 0;
    };

    let mut streak = 0;
    let mut day = last;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Writes freshly computed stats into a stored record.
///
/// The weekly goal is user-owned and survives; everything else is replaced.
/// A week with no readings reports no improvement.
pub fn apply_weekly_stats(
    progress: &mut Progress,
    stats: &WeeklyStats,
    previous: Option<&Progress>,
    now: DateTime<Utc>,
) {
    progress.readings_completed = stats.readings_completed;
    progress.total_time_minutes = stats.total_time_minutes;
    progress.average_score = stats.average_score;
    progress.best_score = stats.best_score;
    progress.worst_score = stats.worst_score;
    progress.total_mistakes = stats.total_mistakes;
    progress.streak_days = stats.streak_days;
    progress.improvement_percentage = if stats.readings_completed == 0 {
        0.0
    } else {
        improvement_percentage(stats.average_score, previous)
    };
    progress.goal_achieved = goal_achieved(stats.readings_completed, progress.weekly_goal);
    progress.updated_at = now;
}

//=========================================================================================
// Reading Statistics
//=========================================================================================

#[derive(Debug, Clone, Copy)]
struct ScoreSummary {
    count: u32,
    average: f64,
    best: f64,
    worst: f64,
}

impl ScoreSummary {
    fn of(scores: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0u32;
        let mut sum = 0.0;
        let mut best = f64::MIN;
        let mut worst = f64::MAX;
        for score in scores {
            count += 1;
            sum += score;
            best = best.max(score);
            worst = worst.min(score);
        }
        (count > 0).then(|| Self {
            count,
            average: sum / f64::from(count),
            best,
            worst,
        })
    }
}

/// Totals over an arbitrary set of completed readings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingStats {
    pub total_readings: u32,
    pub average_score: f64,
    pub total_time_minutes: f64,
    pub best_score: f64,
    pub worst_score: f64,
}

impl ReadingStats {
    pub fn from_readings(readings: &[Reading]) -> Self {
        let completed: Vec<&Reading> = readings.iter().filter(|r| r.completed).collect();
        let Some(summary) = ScoreSummary::of(completed.iter().map(|r| r.score)) else {
            return Self::default();
        };
        let total_seconds: u64 = completed.iter().map(|r| u64::from(r.duration_seconds)).sum();
        Self {
            total_readings: summary.count,
            average_score: round2(summary.average),
            total_time_minutes: round2(total_seconds as f64 / 60.0),
            best_score: summary.best,
            worst_score: summary.worst,
        }
    }
}

/// Mean score of the completed readings, or `None` if there are none.
pub fn average_score(readings: &[Reading]) -> Option<f64> {
    ScoreSummary::of(readings.iter().filter(|r| r.completed).map(|r| r.score))
        .map(|s| round2(s.average))
}

/// Improvement of a reading over the same user's previous reading of the same poem.
pub fn reading_improvement(current: &Reading, previous: Option<&Reading>) -> f64 {
    match previous {
        Some(prev) if prev.score > 0.0 => round2((current.score - prev.score) / prev.score * 100.0),
        _ => 0.0,
    }
}

//=========================================================================================
// Monthly Roll-up
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyTotals {
    pub total_readings: u32,
    pub total_time_minutes: f64,
    /// Mean of the weekly averages.
    pub average_score: f64,
    pub goals_achieved: u32,
    pub total_mistakes: u32,
}

#[derive(Debug, Clone)]
pub struct MonthlySummary {
    pub weeks: Vec<Progress>,
    pub totals: MonthlyTotals,
}

/// The range of week starts that belong to a calendar month.
pub fn month_range(year: i32, month: u32) -> Option<TimeRange> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(TimeRange::between(
        Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN)),
        Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)),
    ))
}

/// Rolls weekly records up into month totals. Weeks are returned oldest first.
pub fn summarize_month(mut weeks: Vec<Progress>) -> MonthlySummary {
    weeks.sort_by_key(|w| w.week_start);
    let mut totals = MonthlyTotals::default();
    for week in &weeks {
        totals.total_readings += week.readings_completed;
        totals.total_time_minutes += week.total_time_minutes;
        totals.average_score += week.average_score;
        totals.goals_achieved += u32::from(week.goal_achieved);
        totals.total_mistakes += week.total_mistakes;
    }
    if !weeks.is_empty() {
        totals.average_score = round2(totals.average_score / weeks.len() as f64);
    }
    totals.total_time_minutes = round2(totals.total_time_minutes);
    MonthlySummary { weeks, totals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Mistake, MistakeKind, Severity};
    use uuid::Uuid;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn reading(score: f64, seconds: u32, created_at: &str) -> Reading {
        let created_at = at(created_at);
        Reading {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            poem_id: Uuid::nil(),
            score,
            duration_seconds: seconds,
            completed: true,
            recording_url: None,
            feedback: None,
            mistakes: Vec::new(),
            session: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn week_with_average(average: f64) -> Progress {
        let mut p = Progress::empty(Uuid::nil(), at("2024-03-03T00:00:00Z"), Utc::now());
        p.average_score = average;
        p
    }

    #[test]
    fn window_starts_on_sunday_midnight() {
        // 2024-03-06 is a Wednesday.
        let w = WeekWindow::containing(at("2024-03-06T15:30:00Z"));
        assert_eq!(w.start, at("2024-03-03T00:00:00Z"));
        assert_eq!(w.end, at("2024-03-10T00:00:00Z"));
        assert!(w.contains(at("2024-03-03T00:00:00Z")));
        assert!(!w.contains(at("2024-03-10T00:00:00Z")));

        let sunday = WeekWindow::containing(at("2024-03-10T00:00:00Z"));
        assert_eq!(sunday.start, at("2024-03-10T00:00:00Z"));
        assert_eq!(w.previous().start, at("2024-02-25T00:00:00Z"));
    }

    #[test]
    fn weekly_stats_for_two_readings() {
        let window = WeekWindow::containing(at("2024-03-06T12:00:00Z"));
        let readings = vec![
            reading(80.0, 90, "2024-03-04T10:00:00Z"),
            reading(90.0, 150, "2024-03-05T10:00:00Z"),
        ];
        let stats = WeeklyStats::from_readings(&readings, &window);
        assert_eq!(stats.readings_completed, 2);
        assert_eq!(stats.average_score, 85.0);
        assert_eq!(stats.best_score, 90.0);
        assert_eq!(stats.worst_score, 80.0);
        assert_eq!(stats.total_time_minutes, 4.0);
        assert_eq!(stats.streak_days, 2);
    }

    #[test]
    fn weekly_stats_skip_incomplete_and_out_of_window() {
        let window = WeekWindow::containing(at("2024-03-06T12:00:00Z"));
        let mut abandoned = reading(10.0, 30, "2024-03-05T10:00:00Z");
        abandoned.completed = false;
        let mut with_mistakes = reading(70.0, 60, "2024-03-06T10:00:00Z");
        with_mistakes.mistakes = vec![
            Mistake {
                word: "brume".into(),
                position: 3,
                kind: MistakeKind::Pronunciation,
                severity: Severity::Low,
            };
            3
        ];
        let readings = vec![
            abandoned,
            with_mistakes,
            reading(100.0, 60, "2024-03-10T00:00:00Z"),
        ];
        let stats = WeeklyStats::from_readings(&readings, &window);
        assert_eq!(stats.readings_completed, 1);
        assert_eq!(stats.average_score, 70.0);
        assert_eq!(stats.total_mistakes, 3);
    }

    #[test]
    fn empty_week_is_zeroed() {
        let window = WeekWindow::containing(at("2024-03-06T12:00:00Z"));
        assert_eq!(WeeklyStats::from_readings(&[], &window), WeeklyStats::default());
    }

    #[test]
    fn improvement_without_previous_week_is_zero() {
        assert_eq!(improvement_percentage(85.0, None), 0.0);
        assert_eq!(improvement_percentage(85.0, Some(&week_with_average(0.0))), 0.0);
    }

    #[test]
    fn improvement_against_previous_week() {
        assert_eq!(improvement_percentage(90.0, Some(&week_with_average(80.0))), 12.5);
        assert_eq!(improvement_percentage(60.0, Some(&week_with_average(80.0))), -25.0);
        assert_eq!(improvement_percentage(70.0, Some(&week_with_average(30.0))), 133.33);
    }

    #[test]
    fn goal_needs_a_goal() {
        assert!(!goal_achieved(10, None));
        assert!(goal_achieved(3, Some(3)));
        assert!(!goal_achieved(2, Some(3)));
    }

    #[test]
    fn streak_counts_back_from_last_active_day() {
        let days = [
            at("2024-03-03T08:00:00Z"),
            at("2024-03-05T08:00:00Z"),
            at("2024-03-06T08:00:00Z"),
            at("2024-03-06T20:00:00Z"),
            at("2024-03-07T08:00:00Z"),
        ];
        assert_eq!(streak_days(days), 3);
        assert_eq!(streak_days(std::iter::empty()), 0);
    }

    #[test]
    fn applying_stats_keeps_goal_and_is_idempotent() {
        let window = WeekWindow::containing(at("2024-03-06T12:00:00Z"));
        let readings = vec![
            reading(80.0, 60, "2024-03-04T10:00:00Z"),
            reading(90.0, 60, "2024-03-05T10:00:00Z"),
        ];
        let stats = WeeklyStats::from_readings(&readings, &window);
        let now = at("2024-03-06T12:00:00Z");

        let mut progress = Progress::empty(Uuid::nil(), window.start, now);
        progress.weekly_goal = Some(2);
        apply_weekly_stats(&mut progress, &stats, Some(&week_with_average(68.0)), now);
        let first = progress.clone();
        apply_weekly_stats(&mut progress, &stats, Some(&week_with_average(68.0)), now);

        assert_eq!(progress, first);
        assert_eq!(progress.weekly_goal, Some(2));
        assert!(progress.goal_achieved);
        assert_eq!(progress.improvement_percentage, 25.0);
    }

    #[test]
    fn reading_stats_and_poem_average() {
        let readings = vec![
            reading(50.0, 120, "2024-03-04T10:00:00Z"),
            reading(75.0, 60, "2024-03-05T10:00:00Z"),
        ];
        let stats = ReadingStats::from_readings(&readings);
        assert_eq!(stats.total_readings, 2);
        assert_eq!(stats.average_score, 62.5);
        assert_eq!(stats.total_time_minutes, 3.0);
        assert_eq!(average_score(&readings), Some(62.5));
        assert_eq!(average_score(&[]), None);
    }

    #[test]
    fn reading_improvement_over_previous_attempt() {
        let prev = reading(60.0, 60, "2024-03-04T10:00:00Z");
        let cur = reading(75.0, 60, "2024-03-05T10:00:00Z");
        assert_eq!(reading_improvement(&cur, Some(&prev)), 25.0);
        assert_eq!(reading_improvement(&cur, None), 0.0);
    }

    #[test]
    fn month_roll_up() {
        let range = month_range(2024, 12).unwrap();
        assert_eq!(range.from, Some(at("2024-12-01T00:00:00Z")));
        assert_eq!(range.until, Some(at("2025-01-01T00:00:00Z")));
        assert!(month_range(2024, 13).is_none());

        let mut a = week_with_average(80.0);
        a.readings_completed = 3;
        a.goal_achieved = true;
        let mut b = week_with_average(70.0);
        b.week_start = at("2024-03-10T00:00:00Z");
        b.readings_completed = 1;
        let summary = summarize_month(vec![b, a]);
        assert_eq!(summary.weeks[0].readings_completed, 3);
        assert_eq!(summary.totals.total_readings, 4);
        assert_eq!(summary.totals.average_score, 75.0);
        assert_eq!(summary.totals.goals_achieved, 1);
    }
}
