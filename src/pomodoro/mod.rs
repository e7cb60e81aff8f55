//! 专注/休息状态机。
//!
//! ```text
//! Stopped -> Running <-> Paused
//! Running | Paused -> Stopped
//! ```
//!
//! 状态机是同步的，不持有定时器也不做 IO：调用方负责每秒调用
//! [`PomodoroTimer::tick`]，并处理返回的 [`SessionEvent`]（持久化、通知）。
//! `remaining_seconds` 只由节拍和显式命令改变，从不按墙钟差值重算。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::TransitionError;
use crate::models::{
    DailyStats, DurationSettings, FocusSession, Phase, Streak, TimerState,
    MIN_RECORDED_FOCUS_SECONDS,
};

pub mod background;
pub mod policy;

pub use background::{BackgroundPolicy, BackgroundReconciler, ResumeOutcome, WelcomeBack, WelcomeChoice};
pub use policy::DurationPolicy;

pub type Transition = Result<Vec<SessionEvent>, TransitionError>;

/// 当前运行（不跨进程保存）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSession {
    pub state: TimerState,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub initial_seconds: u32,
    pub phase_started_at: Option<DateTime<Utc>>,
    /// 本阶段是否已写过历史记录
    #[serde(skip)]
    recorded: bool,
}

impl TimerSession {
    pub fn elapsed_seconds(&self) -> u32 {
        self.initial_seconds.saturating_sub(self.remaining_seconds)
    }
}

/// 状态变化事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseStarted {
        phase: Phase,
        seconds: u32,
        at: DateTime<Utc>,
    },
    Paused {
        remaining_seconds: u32,
        at: DateTime<Utc>,
    },
    Resumed {
        remaining_seconds: u32,
        at: DateTime<Utc>,
    },
    Ticked {
        remaining_seconds: u32,
    },
    FocusRecorded {
        session: FocusSession,
    },
    PhaseCompleted {
        finished: Phase,
        next: Phase,
        next_seconds: u32,
        at: DateTime<Utc>,
    },
    StatsChanged {
        stats: DailyStats,
        streak: Streak,
    },
    Stopped {
        at: DateTime<Utc>,
    },
}

/// 给界面层的只读快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub initial_seconds: u32,
    pub phase_started_at: Option<DateTime<Utc>>,
    pub completed_focus_sessions_today: u32,
    pub total_focus_seconds_today: u64,
    pub streak_days: u32,
    pub progress: f32,
}

/// 番茄钟计时器
pub struct PomodoroTimer {
    clock: Arc<dyn Clock>,
    policy: DurationPolicy,
    session: TimerSession,
    stats: DailyStats,
    streak: Streak,
}

impl PomodoroTimer {
    pub fn new(
        settings: DurationSettings,
        stats: DailyStats,
        streak: Streak,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clock,
            policy: DurationPolicy::new(settings),
            session: TimerSession::default(),
            stats,
            streak,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn state(&self) -> TimerState {
        self.session.state
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn session(&self) -> &TimerSession {
        &self.session
    }

    pub fn stats(&self) -> &DailyStats {
        &self.stats
    }

    pub fn streak(&self) -> &Streak {
        &self.streak
    }

    pub fn settings(&self) -> &DurationSettings {
        self.policy.settings()
    }

    /// 只影响之后开始的阶段
    pub fn update_settings(&mut self, settings: DurationSettings) {
        self.policy = DurationPolicy::new(settings);
    }

    /// 检查日期变化：清零当日计数，过期的连续天数归零
    pub fn refresh_day(&mut self) -> Vec<SessionEvent> {
        let today = self.clock.today();
        let rolled = self.stats.roll_over(today);
        let broke = self.streak.check(today);
        if rolled || broke {
            debug!(rolled, broke, %today, "day boundary observed");
            vec![self.stats_changed()]
        } else {
            Vec::new()
        }
    }

    /// 开始专注
    pub fn start(&mut self) -> Transition {
        self.expect_state("start", &[TimerState::Stopped])?;
        let (phase, seconds) = self.policy.focus();
        let now = self.clock.now();
        info!(seconds, "focus started");
        Ok(vec![self.begin_phase(phase, seconds, now)])
    }

    /// 暂停
    pub fn pause(&mut self) -> Transition {
        self.expect_state("pause", &[TimerState::Running])?;
        self.session.state = TimerState::Paused;
        debug!(remaining = self.session.remaining_seconds, "paused");
        Ok(vec![SessionEvent::Paused {
            remaining_seconds: self.session.remaining_seconds,
            at: self.clock.now(),
        }])
    }

    /// 恢复
    pub fn resume(&mut self) -> Transition {
        self.expect_state("resume", &[TimerState::Paused])?;
        self.session.state = TimerState::Running;
        debug!(remaining = self.session.remaining_seconds, "resumed");
        Ok(vec![SessionEvent::Resumed {
            remaining_seconds: self.session.remaining_seconds,
            at: self.clock.now(),
        }])
    }

    /// 减少一秒；归零时完成当前阶段并自动进入下一阶段
    pub fn tick(&mut self) -> Transition {
        self.expect_state("tick", &[TimerState::Running])?;
        self.session.remaining_seconds = self.session.remaining_seconds.saturating_sub(1);
        let mut events = vec![SessionEvent::Ticked {
            remaining_seconds: self.session.remaining_seconds,
        }];
        if self.session.remaining_seconds == 0 {
            events.extend(self.complete_phase());
        }
        Ok(events)
    }

    /// 提前结束；专注满一分钟则记录部分时长
    pub fn end_early(&mut self) -> Transition {
        self.expect_state("end", &[TimerState::Running, TimerState::Paused])?;
        let mut events = Vec::new();
        if self.session.phase == Phase::Focus {
            let elapsed = self.session.elapsed_seconds();
            if let Some(session) = self.take_record(elapsed) {
                events.push(SessionEvent::FocusRecorded { session });
            }
        }
        let at = self.clock.now();
        info!(phase = ?self.session.phase, elapsed = self.session.elapsed_seconds(), "session ended");
        self.session = TimerSession::default();
        events.push(SessionEvent::Stopped { at });
        Ok(events)
    }

    /// 跳过：休息直接进入专注，专注则结束
    pub fn skip_phase(&mut self) -> Transition {
        self.expect_state("skip", &[TimerState::Running, TimerState::Paused])?;
        if self.session.phase == Phase::Focus {
            return self.end_early();
        }
        let (phase, seconds) = self.policy.focus();
        let now = self.clock.now();
        debug!(from = ?self.session.phase, "break skipped");
        Ok(vec![self.begin_phase(phase, seconds, now)])
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let today = self.clock.today();
        let (completed, total) = if self.stats.last_session_date == Some(today) {
            (self.stats.completed_focus_sessions, self.stats.total_focus_seconds)
        } else {
            (0, 0)
        };
        TimerSnapshot {
            state: self.session.state,
            phase: self.session.phase,
            remaining_seconds: self.session.remaining_seconds,
            initial_seconds: self.session.initial_seconds,
            phase_started_at: self.session.phase_started_at,
            completed_focus_sessions_today: completed,
            total_focus_seconds_today: total,
            streak_days: self.streak.days,
            progress: self.progress(),
        }
    }

    /// 获取进度百分比
    pub fn progress(&self) -> f32 {
        let total = self.session.initial_seconds;
        if total == 0 {
            return 0.0;
        }
        (self.session.elapsed_seconds() as f32 / total as f32) * 100.0
    }

    /// 格式化剩余时间
    pub fn format_remaining(&self) -> String {
        let minutes = self.session.remaining_seconds / 60;
        let seconds = self.session.remaining_seconds % 60;
        format!("{:02}:{:02}", minutes, seconds)
    }

    fn expect_state(
        &self,
        command: &'static str,
        allowed: &[TimerState],
    ) -> Result<(), TransitionError> {
        if allowed.contains(&self.session.state) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                command,
                state: self.session.state,
            })
        }
    }

    fn begin_phase(&mut self, phase: Phase, seconds: u32, at: DateTime<Utc>) -> SessionEvent {
        let seconds = seconds.max(1);
        self.session = TimerSession {
            state: TimerState::Running,
            phase,
            remaining_seconds: seconds,
            initial_seconds: seconds,
            phase_started_at: Some(at),
            recorded: false,
        };
        SessionEvent::PhaseStarted { phase, seconds, at }
    }

    fn take_record(&mut self, duration_seconds: u32) -> Option<FocusSession> {
        if self.session.recorded || duration_seconds < MIN_RECORDED_FOCUS_SECONDS {
            return None;
        }
        self.session.recorded = true;
        let started_at = self.session.phase_started_at.unwrap_or_else(|| self.clock.now());
        Some(FocusSession::new(started_at, duration_seconds))
    }

    fn complete_phase(&mut self) -> Vec<SessionEvent> {
        let now = self.clock.now();
        let finished = self.session.phase;
        let mut events = Vec::new();

        if finished == Phase::Focus {
            let duration = self.session.initial_seconds;
            if let Some(session) = self.take_record(duration) {
                events.push(SessionEvent::FocusRecorded { session });
            }
            let today = self.clock.today();
            self.stats.record_focus(today, duration);
            self.streak.record_completion(today);
            events.push(self.stats_changed());
        }

        let (next, next_seconds) = self
            .policy
            .after(finished, self.stats.completed_focus_sessions);
        info!(?finished, ?next, next_seconds, "phase completed");
        events.push(SessionEvent::PhaseCompleted {
            finished,
            next,
            next_seconds,
            at: now,
        });
        events.push(self.begin_phase(next, next_seconds, now));
        events
    }

    fn stats_changed(&self) -> SessionEvent {
        SessionEvent::StatsChanged {
            stats: self.stats.clone(),
            streak: self.streak.clone(),
        }
    }
}
