//! 应用核心：把提醒集合、计时器、后台对账和通知调度组合成一组命令。
//!
//! 每条命令的顺序固定为：状态变化 -> 持久化 -> 通知调度。通知失败只记录，
//! 不回滚状态；持久化失败只记录，下次读取回退为默认值。

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::Analytics;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db::{keys, Gateway, KeyValueStore, SqliteStore};
use crate::error::{NotifyError, ReminderError, SettingsError, StoreError};
use crate::models::{DurationSettings, FocusSession, Reminder, TimerState};
use crate::notify::{
    LocalNotificationCenter, MessagePicker, NotificationIntent, NotificationService,
    ReminderScheduler, SchedulePolicy, SyncReport, BACKGROUND_PAUSE_ID,
};
use crate::pomodoro::{
    BackgroundPolicy, BackgroundReconciler, PomodoroTimer, ResumeOutcome, SessionEvent,
    TimerSnapshot, Transition, WelcomeBack, WelcomeChoice,
};
use crate::reminders::ReminderBook;

/// 桌面环境下的核心
pub type SqliteCore = Core<SqliteStore, LocalNotificationCenter<SqliteStore>>;

/// 给界面层的只读快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppSnapshot {
    pub timer: TimerSnapshot,
    pub active: Vec<Reminder>,
    pub completed: Vec<Reminder>,
    pub welcome_back: Option<WelcomeBack>,
    pub notification_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// 已排期后台暂停提醒
    pub notice_scheduled: bool,
    /// 欢迎回来询问超时，已自动继续
    pub auto_resumed: bool,
}

pub struct Core<S, N> {
    clock: Arc<dyn Clock>,
    gateway: Gateway<S>,
    notifications: N,
    book: ReminderBook,
    timer: PomodoroTimer,
    background: BackgroundReconciler,
    scheduler: ReminderScheduler,
    last_notification_error: Option<String>,
}

impl<S: KeyValueStore, N: NotificationService> Core<S, N> {
    /// 从存储加载全部状态
    pub fn new(store: S, notifications: N, clock: Arc<dyn Clock>) -> Self {
        let gateway = Gateway::new(store);
        let book = ReminderBook::new(gateway.reminders(), gateway.completed_reminders());
        let timer = PomodoroTimer::new(
            gateway.duration_settings(),
            gateway.daily_stats(),
            gateway.streak(),
            clock.clone(),
        );
        debug!(
            active = book.active().len(),
            completed = book.completed().len(),
            "core loaded"
        );
        let mut core = Self {
            clock,
            gateway,
            notifications,
            book,
            timer,
            background: BackgroundReconciler::default(),
            scheduler: ReminderScheduler::new(SchedulePolicy::default(), MessagePicker::from_entropy()),
            last_notification_error: None,
        };
        let events = core.timer.refresh_day();
        core.handle_events(&events);
        core
    }

    pub fn with_policies(mut self, background: BackgroundPolicy, schedule: SchedulePolicy) -> Self {
        self.background = BackgroundReconciler::new(background);
        self.scheduler = ReminderScheduler::new(schedule, MessagePicker::from_entropy());
        self
    }

    /// 注入消息随机源
    pub fn with_messages(mut self, messages: MessagePicker) -> Self {
        let policy = *self.scheduler.policy();
        self.scheduler = ReminderScheduler::new(policy, messages);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn reminders(&self) -> &[Reminder] {
        self.book.active()
    }

    pub fn completed_reminders(&self) -> &[Reminder] {
        self.book.completed()
    }

    pub fn find_reminder(&self, prefix: &str) -> Result<&Reminder, ReminderError> {
        self.book.find_active(prefix)
    }

    pub fn focus_sessions(&self) -> Vec<FocusSession> {
        self.gateway.focus_sessions()
    }

    pub fn timer(&self) -> &PomodoroTimer {
        &self.timer
    }

    pub fn duration_settings(&self) -> &DurationSettings {
        self.timer.settings()
    }

    pub fn notifications(&self) -> &N {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut N {
        &mut self.notifications
    }

    pub fn last_notification_error(&self) -> Option<&str> {
        self.last_notification_error.as_deref()
    }

    // ==================== Reminders ====================

    pub fn add_reminder(
        &mut self,
        title: &str,
        due_at: DateTime<Utc>,
    ) -> Result<Reminder, ReminderError> {
        self.insert_reminder(Reminder::new(title, due_at))
    }

    /// 使用调用方给定的标识符
    pub fn insert_reminder(&mut self, reminder: Reminder) -> Result<Reminder, ReminderError> {
        self.reload_reminders();
        let added = self.book.add(reminder)?.clone();
        self.persist_reminders();
        self.reschedule();
        Ok(added)
    }

    /// 按标识符（或唯一前缀）完成提醒
    pub fn complete_reminder(&mut self, prefix: &str) -> Result<Reminder, ReminderError> {
        self.reload_reminders();
        let identifier = self.book.find_active(prefix)?.identifier.clone();
        let reminder = self.book.complete(&identifier)?;
        self.persist_reminders();
        self.forget(&identifier);
        self.reschedule();
        Ok(reminder)
    }

    pub fn delete_reminder(&mut self, prefix: &str) -> Result<Reminder, ReminderError> {
        self.reload_reminders();
        let identifier = self.book.find_active(prefix)?.identifier.clone();
        let reminder = self.book.delete(&identifier)?;
        self.persist_reminders();
        self.forget(&identifier);
        self.reschedule();
        Ok(reminder)
    }

    pub fn clear_completed_history(&mut self) -> usize {
        self.reload_reminders();
        let count = self.book.clear_completed();
        self.persist_reminders();
        count
    }

    /// 重新读取提醒、检查日期并对账通知
    pub fn refresh(&mut self) -> SyncReport {
        self.reload_reminders();
        let events = self.timer.refresh_day();
        self.handle_events(&events);
        self.reschedule()
    }

    /// 点击通知：从不删除提醒，只刷新并返回逾期数量
    pub fn on_notification_response(&mut self, id: &str) -> usize {
        info!(id, "notification opened");
        self.refresh();
        self.book.overdue_count(self.clock.now())
    }

    // ==================== Focus ====================

    pub fn start_focus(&mut self) -> Transition {
        let events = self.timer.refresh_day();
        self.handle_events(&events);
        let result = self.timer.start();
        self.apply(result)
    }

    pub fn pause_focus(&mut self) -> Transition {
        let result = self.timer.pause();
        self.apply(result)
    }

    pub fn resume_focus(&mut self) -> Transition {
        self.background.dismiss_prompt();
        let result = self.timer.resume();
        self.apply(result)
    }

    pub fn end_focus_early(&mut self) -> Transition {
        self.background.dismiss_prompt();
        let result = self.timer.end_early();
        self.apply(result)
    }

    pub fn skip_phase(&mut self) -> Transition {
        self.background.dismiss_prompt();
        let result = self.timer.skip_phase();
        self.apply(result)
    }

    pub fn tick(&mut self) -> Transition {
        let result = self.timer.tick();
        self.apply(result)
    }

    /// 只影响之后开始的阶段
    pub fn update_duration_settings(
        &mut self,
        settings: DurationSettings,
    ) -> Result<(), SettingsError> {
        settings.validate()?;
        self.timer.update_settings(settings);
        self.persist(keys::DURATION_SETTINGS, &settings);
        info!(?settings, "duration settings updated");
        Ok(())
    }

    pub fn reset_duration_settings(&mut self) -> DurationSettings {
        let settings = DurationSettings::default();
        self.timer.update_settings(settings);
        self.persist(keys::DURATION_SETTINGS, &settings);
        settings
    }

    pub fn clear_focus_history(&mut self) -> Result<(), StoreError> {
        self.gateway.clear_focus_sessions()?;
        info!("focus history cleared");
        Ok(())
    }

    // ==================== Background ====================

    pub fn on_background_enter(&mut self) -> Vec<SessionEvent> {
        let events = self.background.enter(&mut self.timer);
        self.handle_events(&events);
        events
    }

    pub fn on_background_exit(&mut self) -> ResumeOutcome {
        let outcome = self.background.exit(&self.timer);
        self.cancel_background_notice();
        self.reload_reminders();
        let events = self.timer.refresh_day();
        self.handle_events(&events);
        outcome
    }

    pub fn answer_welcome_back(&mut self, choice: WelcomeChoice) -> Transition {
        let result = self.background.answer(choice, &mut self.timer);
        self.apply(result)
    }

    /// 周期检查：后台暂停提醒和欢迎回来询问超时
    pub fn poll(&mut self) -> PollOutcome {
        let now = self.clock.now();
        let mut outcome = PollOutcome::default();
        if self.background.poll_notice(now) && self.timer.state() == TimerState::Paused {
            match self
                .notifications
                .schedule(&NotificationIntent::background_pause(now))
            {
                Ok(()) => outcome.notice_scheduled = true,
                Err(e) => self.note_notify_error(&e),
            }
        }
        if let Some(result) = self.background.poll_prompt(&mut self.timer) {
            outcome.auto_resumed = self.apply(result).is_ok();
        }
        outcome
    }

    // ==================== Views ====================

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            timer: self.timer.snapshot(),
            active: self.book.active().to_vec(),
            completed: self.book.completed().to_vec(),
            welcome_back: self.background.pending_prompt().copied(),
            notification_error: self.last_notification_error.clone(),
        }
    }

    pub fn analytics(&self) -> Analytics {
        let now = self.clock.now();
        Analytics::compute(
            self.book.active(),
            self.book.completed(),
            &self.gateway.focus_sessions(),
            now,
            now.date_naive(),
        )
    }

    // ==================== Internals ====================

    fn apply(&mut self, result: Transition) -> Transition {
        match &result {
            Ok(events) => self.handle_events(events),
            Err(e) => debug!(error = %e, "command rejected"),
        }
        result
    }

    fn handle_events(&mut self, events: &[SessionEvent]) {
        for event in events {
            match event {
                SessionEvent::FocusRecorded { session } => {
                    if let Err(e) = self.gateway.append_focus_session(session) {
                        warn!(error = %e, "focus session not saved");
                    }
                }
                SessionEvent::StatsChanged { stats, streak } => {
                    self.persist(keys::DAILY_STATS, stats);
                    self.persist(keys::STREAK, streak);
                }
                SessionEvent::Resumed { .. } | SessionEvent::Stopped { .. } => {
                    self.cancel_background_notice();
                }
                _ => {}
            }
        }
    }

    fn persist<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        if let Err(e) = self.gateway.save(key, value) {
            warn!(key, error = %e, "write failed");
        }
    }

    /// 其他进程（命令行、守护进程）可能已改写提醒，先以存储为准
    fn reload_reminders(&mut self) {
        self.book = ReminderBook::new(self.gateway.reminders(), self.gateway.completed_reminders());
    }

    fn persist_reminders(&mut self) {
        let active = self.book.active().to_vec();
        let completed = self.book.completed().to_vec();
        self.persist(keys::REMINDERS, &active);
        self.persist(keys::COMPLETED_REMINDERS, &completed);
    }

    fn reschedule(&mut self) -> SyncReport {
        let now = self.clock.now();
        match self
            .scheduler
            .sync(self.book.active(), now, &mut self.notifications)
        {
            Ok(report) => {
                self.last_notification_error = report.failures.first().cloned();
                report
            }
            Err(e) => {
                self.note_notify_error(&e);
                SyncReport {
                    failures: vec![e.to_string()],
                    ..SyncReport::default()
                }
            }
        }
    }

    fn forget(&mut self, identifier: &str) {
        if let Err(e) = self.scheduler.forget(identifier, &mut self.notifications) {
            self.note_notify_error(&e);
        }
    }

    fn cancel_background_notice(&mut self) {
        let ids = [BACKGROUND_PAUSE_ID.to_string()];
        let result = self
            .notifications
            .cancel_pending(&ids)
            .and_then(|()| self.notifications.cancel_delivered(&ids));
        if let Err(e) = result {
            self.note_notify_error(&e);
        }
    }

    fn note_notify_error(&mut self, e: &NotifyError) {
        warn!(error = %e, "notification request failed");
        self.last_notification_error = Some(e.to_string());
    }
}

/// 打开数据目录中的数据库，按配置组装核心
pub fn open(config: &AppConfig) -> AnyResult<SqliteCore> {
    let path = config.database_path()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = SqliteStore::open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut center = LocalNotificationCenter::new(SqliteStore::open(&path)?, clock.clone());
    center.set_authorized(config.notifications.enabled);
    debug!(path = %path.display(), "using database");
    Ok(Core::new(store, center, clock).with_policies(config.background, config.reminders))
}
