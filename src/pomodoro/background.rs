//! 前后台切换的对账。
//!
//! 专注阶段进入后台时强制暂停，并在固定延迟后（若仍在后台）发出一条
//! "已暂停" 通知；休息阶段在后台继续倒计时。回到前台时用墙钟差值
//! 计算离开时长，必要时给出 "欢迎回来" 的选择，超时默认继续。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{PomodoroTimer, SessionEvent, Transition};
use crate::models::{Phase, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundPolicy {
    /// 后台多久后提醒专注已暂停
    pub pause_notice_after_secs: u64,
    /// 离开超过该秒数才询问
    pub welcome_back_after_secs: u64,
    /// 询问无响应时自动继续
    pub prompt_timeout_secs: u64,
}

impl Default for BackgroundPolicy {
    fn default() -> Self {
        Self {
            pause_notice_after_secs: 120,
            welcome_back_after_secs: 10,
            prompt_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
struct Suspension {
    entered_at: DateTime<Utc>,
    was_running: bool,
    notice_at: Option<DateTime<Utc>>,
    notice_sent: bool,
}

/// 回到前台后的询问
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WelcomeBack {
    pub away_seconds: u64,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WelcomeChoice {
    Resume,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Continue { away_seconds: u64 },
    AskUser(WelcomeBack),
}

#[derive(Debug, Default)]
pub struct BackgroundReconciler {
    policy: BackgroundPolicy,
    suspension: Option<Suspension>,
    prompt: Option<WelcomeBack>,
}

impl BackgroundReconciler {
    pub fn new(policy: BackgroundPolicy) -> Self {
        Self {
            policy,
            suspension: None,
            prompt: None,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    pub fn pending_prompt(&self) -> Option<&WelcomeBack> {
        self.prompt.as_ref()
    }

    /// 进入后台。重复调用无副作用。
    pub fn enter(&mut self, timer: &mut PomodoroTimer) -> Vec<SessionEvent> {
        if self.suspension.is_some() {
            return Vec::new();
        }
        let now = timer.now();
        // 询问尚未回答时再次离开，视为仍在专注中被暂停
        let prompt_pending = self.prompt.take().is_some();
        let running = timer.state() == TimerState::Running;

        let mut events = Vec::new();
        let mut notice_at = None;
        if running && timer.phase() == Phase::Focus {
            events = timer.pause().unwrap_or_default();
            notice_at = Some(now + self.delay(self.policy.pause_notice_after_secs));
            info!(remaining = timer.session().remaining_seconds, "focus auto-paused on suspend");
        } else if prompt_pending && timer.state() == TimerState::Paused {
            notice_at = Some(now + self.delay(self.policy.pause_notice_after_secs));
        } else if running {
            debug!(phase = ?timer.phase(), "break continues in background");
        }

        self.suspension = Some(Suspension {
            entered_at: now,
            was_running: running || prompt_pending,
            notice_at,
            notice_sent: false,
        });
        events
    }

    /// 延迟检查：到点且仍在后台时返回 true，只触发一次
    pub fn poll_notice(&mut self, now: DateTime<Utc>) -> bool {
        let Some(suspension) = self.suspension.as_mut() else {
            return false;
        };
        match suspension.notice_at {
            Some(at) if !suspension.notice_sent && at <= now => {
                suspension.notice_sent = true;
                true
            }
            _ => false,
        }
    }

    /// 回到前台
    pub fn exit(&mut self, timer: &PomodoroTimer) -> ResumeOutcome {
        let Some(suspension) = self.suspension.take() else {
            return ResumeOutcome::Continue { away_seconds: 0 };
        };
        let now = timer.now();
        let away_seconds = (now - suspension.entered_at).num_seconds().max(0) as u64;

        if suspension.was_running
            && timer.state() == TimerState::Paused
            && away_seconds > self.policy.welcome_back_after_secs
        {
            let prompt = WelcomeBack {
                away_seconds,
                deadline: now + self.delay(self.policy.prompt_timeout_secs),
            };
            info!(away_seconds, "asking whether to resume focus");
            self.prompt = Some(prompt);
            return ResumeOutcome::AskUser(prompt);
        }
        debug!(away_seconds, "returned from background");
        ResumeOutcome::Continue { away_seconds }
    }

    /// 回答询问；没有待回答的询问时为空操作
    pub fn answer(&mut self, choice: WelcomeChoice, timer: &mut PomodoroTimer) -> Transition {
        if self.prompt.take().is_none() {
            return Ok(Vec::new());
        }
        match choice {
            WelcomeChoice::Resume => timer.resume(),
            WelcomeChoice::End => timer.end_early(),
        }
    }

    /// 询问超时则自动继续
    pub fn poll_prompt(&mut self, timer: &mut PomodoroTimer) -> Option<Transition> {
        let deadline = self.prompt.as_ref()?.deadline;
        if timer.now() < deadline {
            return None;
        }
        debug!("welcome-back prompt timed out");
        Some(self.answer(WelcomeChoice::Resume, timer))
    }

    /// 用户已通过其他命令处理了计时器
    pub fn dismiss_prompt(&mut self) {
        self.prompt = None;
    }

    fn delay(&self, secs: u64) -> Duration {
        Duration::seconds(secs.min(u64::from(u32::MAX)) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::models::{DailyStats, DurationSettings, Streak};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn setup() -> (PomodoroTimer, Arc<ManualClock>, BackgroundReconciler) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
        ));
        let timer = PomodoroTimer::new(
            DurationSettings {
                focus_seconds: 300,
                short_break_seconds: 60,
                long_break_seconds: 120,
                long_break_every_n_sessions: 4,
            },
            DailyStats::default(),
            Streak::default(),
            clock.clone(),
        );
        (timer, clock, BackgroundReconciler::default())
    }

    fn tick(timer: &mut PomodoroTimer, clock: &ManualClock, n: u32) {
        for _ in 0..n {
            clock.advance(1);
            timer.tick().unwrap();
        }
    }

    #[test]
    fn focus_pauses_without_losing_seconds() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        tick(&mut timer, &clock, 42);
        let before = timer.session().remaining_seconds;

        bg.enter(&mut timer);
        assert_eq!(timer.state(), TimerState::Paused);
        assert_eq!(timer.session().remaining_seconds, before);

        clock.advance(600);
        bg.exit(&timer);
        assert_eq!(timer.session().remaining_seconds, before);
    }

    #[test]
    fn enter_is_idempotent() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        assert!(!bg.enter(&mut timer).is_empty());
        clock.advance(5);
        assert!(bg.enter(&mut timer).is_empty());
        assert_eq!(timer.state(), TimerState::Paused);
    }

    #[test]
    fn break_keeps_running_in_background() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        tick(&mut timer, &clock, 300);
        assert_eq!(timer.phase(), Phase::ShortBreak);

        bg.enter(&mut timer);
        assert_eq!(timer.state(), TimerState::Running);
        clock.advance(200);
        assert!(!bg.poll_notice(clock.now()));
        assert_eq!(bg.exit(&timer), ResumeOutcome::Continue { away_seconds: 200 });
    }

    #[test]
    fn notice_fires_once_after_delay() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        bg.enter(&mut timer);
        clock.advance(119);
        assert!(!bg.poll_notice(clock.now()));
        clock.advance(1);
        assert!(bg.poll_notice(clock.now()));
        assert!(!bg.poll_notice(clock.now()));
    }

    #[test]
    fn short_absence_does_not_prompt() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        bg.enter(&mut timer);
        clock.advance(10);
        assert_eq!(bg.exit(&timer), ResumeOutcome::Continue { away_seconds: 10 });
        assert!(bg.pending_prompt().is_none());
        assert_eq!(timer.state(), TimerState::Paused);
    }

    #[test]
    fn long_absence_prompts_and_times_out_to_resume() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        bg.enter(&mut timer);
        clock.advance(45);
        let outcome = bg.exit(&timer);
        assert!(matches!(outcome, ResumeOutcome::AskUser(WelcomeBack { away_seconds: 45, .. })));

        clock.advance(9);
        assert!(bg.poll_prompt(&mut timer).is_none());
        clock.advance(1);
        assert!(bg.poll_prompt(&mut timer).unwrap().is_ok());
        assert_eq!(timer.state(), TimerState::Running);
        assert!(bg.pending_prompt().is_none());
    }

    #[test]
    fn answering_end_stops_the_session() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        tick(&mut timer, &clock, 90);
        bg.enter(&mut timer);
        clock.advance(30);
        bg.exit(&timer);
        let events = bg.answer(WelcomeChoice::End, &mut timer).unwrap();
        assert_eq!(timer.state(), TimerState::Stopped);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::FocusRecorded { session } if session.duration_seconds == 90)));
        assert!(bg.answer(WelcomeChoice::Resume, &mut timer).unwrap().is_empty());
    }

    #[test]
    fn clock_moving_backwards_clamps_absence() {
        let (mut timer, clock, mut bg) = setup();
        timer.start().unwrap();
        bg.enter(&mut timer);
        clock.advance(-3600);
        assert_eq!(bg.exit(&timer), ResumeOutcome::Continue { away_seconds: 0 });
    }

    #[test]
    fn stopped_timer_is_left_alone() {
        let (mut timer, clock, mut bg) = setup();
        assert!(bg.enter(&mut timer).is_empty());
        clock.advance(500);
        assert!(!bg.poll_notice(clock.now()));
        assert_eq!(bg.exit(&timer), ResumeOutcome::Continue { away_seconds: 500 });
    }
}
