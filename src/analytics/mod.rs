//! 统计视图：只从提醒集合和专注历史推导，不保存任何状态。

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{FocusSession, Reminder};

/// 每周专注目标：5 小时
pub const WEEKLY_FOCUS_GOAL_SECONDS: u64 = 5 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub completed: usize,
    pub overdue: usize,
    pub on_track: usize,
    /// 整数百分比，向下取整
    pub completion_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub completed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProgress {
    /// 最早的一天在前，最后一天是今天
    pub days: Vec<DayCount>,
    pub total: usize,
    pub daily_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusSummary {
    pub total_seconds: u64,
    pub sessions: usize,
    pub average_seconds: u64,
    pub last_seven_days_seconds: u64,
    /// 周目标完成度，0.0 到 1.0
    pub weekly_goal_progress: f32,
    pub weekly_goal_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub tasks: TaskSummary,
    pub week: WeeklyProgress,
    pub focus: FocusSummary,
}

impl Analytics {
    pub fn compute(
        active: &[Reminder],
        completed: &[Reminder],
        sessions: &[FocusSession],
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Self {
        Self {
            tasks: task_summary(active, completed, now),
            week: weekly_progress(completed, today),
            focus: focus_summary(sessions, now),
        }
    }
}

pub fn task_summary(active: &[Reminder], completed: &[Reminder], now: DateTime<Utc>) -> TaskSummary {
    let overdue = active.iter().filter(|r| r.is_overdue(now)).count();
    let total = completed.len() + active.len();
    let completion_rate = if total == 0 {
        0
    } else {
        (completed.len() * 100 / total) as u32
    };
    TaskSummary {
        completed: completed.len(),
        overdue,
        on_track: active.len() - overdue,
        completion_rate,
    }
}

/// 最近 7 天每天完成的数量（按提醒的截止日期归属）
pub fn weekly_progress(completed: &[Reminder], today: NaiveDate) -> WeeklyProgress {
    let days: Vec<DayCount> = (0..7)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            let completed = completed
                .iter()
                .filter(|r| r.due_at.date_naive() == date)
                .count();
            DayCount { date, completed }
        })
        .collect();
    let total: usize = days.iter().map(|d| d.completed).sum();
    WeeklyProgress {
        days,
        total,
        daily_average: total as f64 / 7.0,
    }
}

pub fn focus_summary(sessions: &[FocusSession], now: DateTime<Utc>) -> FocusSummary {
    let total_seconds: u64 = sessions.iter().map(|s| u64::from(s.duration_seconds)).sum();
    let average_seconds = if sessions.is_empty() {
        0
    } else {
        total_seconds / sessions.len() as u64
    };
    let week_ago = now - Duration::weeks(1);
    let last_seven_days_seconds: u64 = sessions
        .iter()
        .filter(|s| s.started_at >= week_ago)
        .map(|s| u64::from(s.duration_seconds))
        .sum();
    let ratio = last_seven_days_seconds as f64 / WEEKLY_FOCUS_GOAL_SECONDS as f64;
    FocusSummary {
        total_seconds,
        sessions: sessions.len(),
        average_seconds,
        last_seven_days_seconds,
        weekly_goal_progress: ratio.min(1.0) as f32,
        weekly_goal_percent: (last_seven_days_seconds * 100 / WEEKLY_FOCUS_GOAL_SECONDS) as u32,
    }
}

/// `45s`、`12m`、`1h 5m`、`2h`
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(12 * 60 + 30), "12m");
        assert_eq!(format_duration(3600 + 5 * 60), "1h 5m");
        assert_eq!(format_duration(7200), "2h");
    }

    #[test]
    fn completion_rate_rounds_down() {
        let active = vec![
            Reminder::with_identifier("late", now() - Duration::hours(1), "a"),
            Reminder::with_identifier("soon", now() + Duration::hours(1), "b"),
        ];
        let completed = vec![Reminder::with_identifier("done", now(), "c")];
        let summary = task_summary(&active, &completed, now());
        assert_eq!(summary.completion_rate, 33);
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.on_track, 1);
        assert_eq!(task_summary(&[], &[], now()).completion_rate, 0);
    }

    #[test]
    fn weekly_counts_by_due_date() {
        let today = now().date_naive();
        let completed = vec![
            Reminder::with_identifier("a", now(), "a"),
            Reminder::with_identifier("b", now() - Duration::days(2), "b"),
            Reminder::with_identifier("c", now() - Duration::days(2), "c"),
            Reminder::with_identifier("old", now() - Duration::days(9), "d"),
        ];
        let week = weekly_progress(&completed, today);
        assert_eq!(week.days.len(), 7);
        assert_eq!(week.days[6].date, today);
        assert_eq!(week.days[6].completed, 1);
        assert_eq!(week.days[4].completed, 2);
        assert_eq!(week.total, 3);
        assert!((week.daily_average - 3.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn focus_goal_caps_progress_but_not_percent() {
        let sessions = vec![
            FocusSession::new(now() - Duration::days(1), 4 * 3600),
            FocusSession::new(now() - Duration::days(2), 2 * 3600),
            FocusSession::new(now() - Duration::days(10), 1800),
        ];
        let focus = focus_summary(&sessions, now());
        assert_eq!(focus.total_seconds, 6 * 3600 + 1800);
        assert_eq!(focus.sessions, 3);
        assert_eq!(focus.average_seconds, (6 * 3600 + 1800) / 3);
        assert_eq!(focus.last_seven_days_seconds, 6 * 3600);
        assert_eq!(focus.weekly_goal_progress, 1.0);
        assert_eq!(focus.weekly_goal_percent, 120);
    }
}
