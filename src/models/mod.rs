use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SettingsError;

/// 少于此秒数的专注不记录
pub const MIN_RECORDED_FOCUS_SECONDS: u32 = 60;

/// 历史记录的默认标签
pub const FOCUS_SESSION_LABEL: &str = "Focus Session";

/// 计时器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// 阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        matches!(self, Phase::ShortBreak | Phase::LongBreak)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Break",
            Phase::LongBreak => "Long Break",
        }
    }
}

/// 作业提醒（不可变值）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub title: String,
    pub due_at: DateTime<Utc>,
    pub identifier: String,
}

impl Reminder {
    pub fn new(title: impl Into<String>, due_at: DateTime<Utc>) -> Self {
        Self::with_identifier(title, due_at, Uuid::new_v4().to_string())
    }

    pub fn with_identifier(
        title: impl Into<String>,
        due_at: DateTime<Utc>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            due_at,
            identifier: identifier.into(),
        }
    }

    /// 截止时间已到（含等于当前时刻）
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// 专注历史记录，只追加
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u32,
    #[serde(default)]
    pub label: Option<String>,
}

impl FocusSession {
    pub fn new(started_at: DateTime<Utc>, duration_seconds: u32) -> Self {
        Self {
            started_at,
            duration_seconds,
            label: Some(FOCUS_SESSION_LABEL.to_string()),
        }
    }
}

/// 用户可调的时长设置（秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSettings {
    pub focus_seconds: u32,
    pub short_break_seconds: u32,
    pub long_break_seconds: u32,
    pub long_break_every_n_sessions: u32,
}

impl Default for DurationSettings {
    fn default() -> Self {
        Self {
            focus_seconds: 30 * 60,
            short_break_seconds: 10 * 60,
            long_break_seconds: 20 * 60,
            long_break_every_n_sessions: 4,
        }
    }
}

impl DurationSettings {
    pub const MIN_MINUTES: u32 = 1;
    pub const MAX_MINUTES: u32 = 120;

    /// 由分钟构造并校验
    pub fn from_minutes(
        focus: u32,
        short_break: u32,
        long_break: u32,
        long_break_every_n_sessions: u32,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            focus_seconds: focus.saturating_mul(60),
            short_break_seconds: short_break.saturating_mul(60),
            long_break_seconds: long_break.saturating_mul(60),
            long_break_every_n_sessions,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let min = Self::MIN_MINUTES * 60;
        let max = Self::MAX_MINUTES * 60;
        for (field, value) in [
            ("focus_seconds", self.focus_seconds),
            ("short_break_seconds", self.short_break_seconds),
            ("long_break_seconds", self.long_break_seconds),
        ] {
            if !(min..=max).contains(&value) {
                return Err(SettingsError::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
        if self.long_break_every_n_sessions == 0 {
            return Err(SettingsError::OutOfRange {
                field: "long_break_every_n_sessions",
                value: 0,
                min: 1,
                max: u32::MAX,
            });
        }
        Ok(())
    }
}

/// 当日统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub completed_focus_sessions: u32,
    pub total_focus_seconds: u64,
    pub last_session_date: Option<NaiveDate>,
}

impl DailyStats {
    /// 日期变化时清零，返回是否有改动
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_session_date == Some(today) {
            return false;
        }
        self.completed_focus_sessions = 0;
        self.total_focus_seconds = 0;
        self.last_session_date = Some(today);
        true
    }

    pub fn record_focus(&mut self, today: NaiveDate, seconds: u32) {
        self.roll_over(today);
        self.completed_focus_sessions += 1;
        self.total_focus_seconds += u64::from(seconds);
    }
}

/// 连续天数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub days: u32,
    pub last_day: Option<NaiveDate>,
}

impl Streak {
    /// 当天第一次完成专注时调用
    pub fn record_completion(&mut self, today: NaiveDate) -> bool {
        match self.last_day {
            Some(last) if last == today => return false,
            Some(last) if today.pred_opt() == Some(last) => self.days += 1,
            _ => self.days = 1,
        }
        self.last_day = Some(today);
        true
    }

    /// 超过一天没有完成则清零
    pub fn check(&mut self, today: NaiveDate) -> bool {
        match self.last_day {
            Some(last) if (today - last).num_days() > 1 && self.days != 0 => {
                self.days = 0;
                true
            }
            _ => false,
        }
    }
}
