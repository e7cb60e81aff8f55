use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use xprocrastinate::clock::{Clock, ManualClock};
use xprocrastinate::db::{MemoryStore, SqliteStore};
use xprocrastinate::models::{DurationSettings, Phase, Reminder, TimerState};
use xprocrastinate::notify::{
    LocalNotificationCenter, MessagePicker, NotificationKind, NotificationService,
};
use xprocrastinate::pomodoro::{ResumeOutcome, SessionEvent, WelcomeChoice};
use xprocrastinate::Core;

type TestCore = Core<MemoryStore, LocalNotificationCenter<MemoryStore>>;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
    ))
}

fn core_with(clock: &Arc<ManualClock>) -> TestCore {
    let center = LocalNotificationCenter::new(MemoryStore::new(), clock.clone());
    Core::new(MemoryStore::new(), center, clock.clone()).with_messages(MessagePicker::seeded(42))
}

fn ticks(core: &mut TestCore, clock: &ManualClock, n: u32) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    for _ in 0..n {
        clock.advance(1);
        events.extend(core.tick().unwrap());
    }
    events
}

fn pending_ids(core: &TestCore) -> Vec<String> {
    pending_ids_of(core)
}

#[test]
fn remaining_stays_within_bounds_across_phases() {
    let clock = clock();
    let mut core = core_with(&clock);
    core.update_duration_settings(DurationSettings::from_minutes(1, 1, 2, 2).unwrap())
        .unwrap();
    core.start_focus().unwrap();
    for i in 0..600 {
        clock.advance(1);
        core.tick().unwrap();
        if i % 50 == 0 {
            core.pause_focus().unwrap();
            core.resume_focus().unwrap();
        }
        let timer = core.timer().session();
        assert_ne!(timer.state, TimerState::Stopped);
        assert!(timer.initial_seconds > 0);
        assert!(timer.remaining_seconds <= timer.initial_seconds);
    }
}

#[test]
fn ending_early_records_only_sessions_of_a_minute_or_more() {
    let clock = clock();
    let mut core = core_with(&clock);

    core.start_focus().unwrap();
    ticks(&mut core, &clock, 90);
    core.end_focus_early().unwrap();
    let sessions = core.focus_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].duration_seconds, 90);

    core.start_focus().unwrap();
    ticks(&mut core, &clock, 30);
    core.end_focus_early().unwrap();
    assert_eq!(core.focus_sessions().len(), 1);
}

#[test]
fn completed_focus_moves_to_short_break_and_counts() {
    let clock = clock();
    let mut core = core_with(&clock);
    core.update_duration_settings(DurationSettings {
        focus_seconds: 1500,
        ..DurationSettings::default()
    })
    .unwrap();

    core.start_focus().unwrap();
    ticks(&mut core, &clock, 1500);

    let snapshot = core.snapshot().timer;
    assert_eq!(snapshot.phase, Phase::ShortBreak);
    assert_eq!(snapshot.remaining_seconds, 600);
    assert_eq!(snapshot.completed_focus_sessions_today, 1);
    assert_eq!(core.focus_sessions().len(), 1);
}

#[test]
fn every_fourth_completion_earns_a_long_break() {
    let clock = clock();
    let mut core = core_with(&clock);
    let settings = DurationSettings::from_minutes(1, 1, 2, 4).unwrap();
    core.update_duration_settings(settings).unwrap();
    core.start_focus().unwrap();

    let mut breaks = Vec::new();
    for _ in 0..5 {
        ticks(&mut core, &clock, settings.focus_seconds);
        breaks.push(core.timer().phase());
        core.skip_phase().unwrap();
    }
    assert_eq!(
        breaks,
        vec![
            Phase::ShortBreak,
            Phase::ShortBreak,
            Phase::ShortBreak,
            Phase::LongBreak,
            Phase::ShortBreak,
        ]
    );
}

#[test]
fn empty_reminder_set_leaves_no_motivational_notifications() {
    let clock = clock();
    let mut core = core_with(&clock);
    let late = core
        .add_reminder("Lab report", clock.now() - Duration::hours(2))
        .unwrap();
    assert_eq!(
        pending_ids(&core),
        vec![NotificationKind::RepeatingMotivational.key(&late.identifier)]
    );

    core.delete_reminder(&late.identifier).unwrap();
    core.refresh();
    assert!(pending_ids(&core).is_empty());
}

#[test]
fn completing_cancels_only_that_reminders_notifications() {
    let clock = clock();
    let mut core = core_with(&clock);
    core.insert_reminder(Reminder::with_identifier(
        "Essay",
        clock.now() + Duration::minutes(5),
        "essay",
    ))
    .unwrap();
    core.insert_reminder(Reminder::with_identifier(
        "Quiz",
        clock.now() + Duration::minutes(10),
        "quiz",
    ))
    .unwrap();

    // 两个提醒的到期通知都送达
    clock.advance(10 * 60);
    let mut sink = Vec::new();
    core.notifications_mut().deliver_due(&mut Collect(&mut sink)).unwrap();
    sink.sort();
    assert_eq!(sink, vec!["essay", "essay_overdue", "quiz"]);

    core.complete_reminder("quiz").unwrap();
    assert!(!pending_ids(&core).iter().any(|id| id.starts_with("quiz")));
    let mut delivered: Vec<String> = core
        .notifications()
        .list_delivered()
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    delivered.sort();
    assert_eq!(delivered, vec!["essay", "essay_overdue"]);
    assert_eq!(core.completed_reminders()[0].identifier, "quiz");
}

#[test]
fn backgrounding_focus_pauses_without_losing_time() {
    let clock = clock();
    let mut core = core_with(&clock);
    core.start_focus().unwrap();
    ticks(&mut core, &clock, 200);
    let remaining = core.timer().session().remaining_seconds;

    core.on_background_enter();
    assert_eq!(core.timer().state(), TimerState::Paused);
    assert_eq!(core.timer().session().remaining_seconds, remaining);

    clock.advance(3600);
    core.poll();
    let outcome = core.on_background_exit();
    assert!(matches!(outcome, ResumeOutcome::AskUser(_)));
    assert_eq!(core.timer().session().remaining_seconds, remaining);

    core.answer_welcome_back(WelcomeChoice::Resume).unwrap();
    assert_eq!(core.timer().state(), TimerState::Running);
    assert!(pending_ids(&core).is_empty());
}

#[test]
fn repeated_refresh_adds_no_notifications() {
    let clock = clock();
    let mut core = core_with(&clock);
    core.add_reminder("Future", clock.now() + Duration::days(1)).unwrap();
    core.add_reminder("Past", clock.now() - Duration::days(1)).unwrap();
    let before = core.notifications().list_pending().unwrap();

    let first = core.refresh();
    let second = core.refresh();
    assert_eq!(first.scheduled, 0);
    assert_eq!(second.scheduled, 0);
    assert_eq!(second.cancelled, 0);
    assert_eq!(core.notifications().list_pending().unwrap(), before);
}

#[test]
fn notification_response_reports_overdue_count() {
    let clock = clock();
    let mut core = core_with(&clock);
    core.add_reminder("A", clock.now() + Duration::minutes(1)).unwrap();
    core.add_reminder("B", clock.now() + Duration::hours(1)).unwrap();
    clock.advance(120);
    assert_eq!(core.on_notification_response("whatever"), 1);
    assert_eq!(core.reminders().len(), 2);
}

#[test]
fn state_survives_reopening_the_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xpro.db");
    let clock = clock();

    let open = |clock: &Arc<ManualClock>| {
        let center = LocalNotificationCenter::new(SqliteStore::open(&path).unwrap(), clock.clone());
        Core::new(SqliteStore::open(&path).unwrap(), center, clock.clone())
    };

    {
        let mut core = open(&clock);
        core.add_reminder("Essay", clock.now() + Duration::hours(3)).unwrap();
        core.update_duration_settings(DurationSettings::from_minutes(25, 5, 15, 4).unwrap())
            .unwrap();
        core.start_focus().unwrap();
        for _ in 0..(25 * 60) {
            clock.advance(1);
            core.tick().unwrap();
        }
    }

    let core = open(&clock);
    assert_eq!(core.reminders().len(), 1);
    assert_eq!(core.duration_settings().focus_seconds, 25 * 60);
    assert_eq!(core.focus_sessions().len(), 1);
    let snapshot = core.snapshot().timer;
    assert_eq!(snapshot.completed_focus_sessions_today, 1);
    assert_eq!(snapshot.streak_days, 1);
    assert_eq!(snapshot.state, TimerState::Stopped);
    assert_eq!(core.notifications().list_pending().unwrap().len(), 2);
}

#[test]
fn refresh_sees_reminders_changed_by_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("xpro.db");
    let clock = clock();
    let open = |clock: &Arc<ManualClock>| {
        let center = LocalNotificationCenter::new(SqliteStore::open(&path).unwrap(), clock.clone());
        Core::new(SqliteStore::open(&path).unwrap(), center, clock.clone())
    };

    let mut cli = open(&clock);
    cli.insert_reminder(Reminder::with_identifier(
        "Old",
        clock.now() + Duration::hours(2),
        "old",
    ))
    .unwrap();

    // 守护进程在 Old 之后启动，随后命令行另起进程修改提醒
    let mut daemon = open(&clock);
    let mut cli = open(&clock);
    cli.insert_reminder(Reminder::with_identifier(
        "New",
        clock.now() + Duration::hours(1),
        "new",
    ))
    .unwrap();
    cli.complete_reminder("old").unwrap();
    assert_eq!(pending_ids_of(&cli), vec!["new", "new_overdue"]);

    let report = daemon.refresh();
    assert_eq!(report.scheduled, 0);
    assert_eq!(pending_ids_of(&daemon), vec!["new", "new_overdue"]);
    assert_eq!(daemon.reminders().len(), 1);
    assert_eq!(daemon.reminders()[0].identifier, "new");
    assert_eq!(daemon.completed_reminders()[0].identifier, "old");

    // 守护进程自己的修改也基于最新数据，不覆盖命令行的写入
    daemon.complete_reminder("new").unwrap();
    let reopened = open(&clock);
    assert!(reopened.reminders().is_empty());
    assert_eq!(reopened.completed_reminders().len(), 2);
    assert!(pending_ids_of(&reopened).is_empty());
}

fn pending_ids_of<S, N>(core: &Core<S, N>) -> Vec<String>
where
    S: xprocrastinate::db::KeyValueStore,
    N: NotificationService,
{
    let mut ids: Vec<String> = core
        .notifications()
        .list_pending()
        .unwrap()
        .into_iter()
        .map(|p| p.intent.id)
        .collect();
    ids.sort();
    ids
}

struct Collect<'a>(&'a mut Vec<String>);

impl xprocrastinate::notify::Deliver for Collect<'_> {
    fn deliver(
        &mut self,
        intent: &xprocrastinate::notify::NotificationIntent,
    ) -> Result<(), xprocrastinate::error::NotifyError> {
        self.0.push(intent.id.clone());
        Ok(())
    }
}
