//! 提醒通知的调度策略。
//!
//! 每次提醒集合变化（新增、完成、删除）或显式刷新时运行 [`ReminderScheduler::sync`]：
//!
//! - 未到期：到期时一条 `Initial`，到期后 60 秒一条 `Overdue`
//! - 已逾期：不再保留 `Initial`/`Overdue`，改为每 300 秒重复的激励通知
//! - 集合为空：清掉所有激励通知
//!
//! 已存在且触发条件一致的请求直接跳过，所以重复运行不会产生新的通知。

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::{
    keys_for, MessagePicker, NotificationIntent, NotificationKind, NotificationService,
    PendingNotification, Trigger,
};
use crate::error::NotifyError;
use crate::models::Reminder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
    /// 到期后多久发逾期通知
    pub overdue_after_secs: u64,
    /// 激励通知的重复间隔
    pub motivational_every_secs: u64,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            overdue_after_secs: 60,
            motivational_every_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub scheduled: usize,
    pub cancelled: usize,
    pub unchanged: usize,
    /// 被系统拒绝的请求
    pub failures: Vec<String>,
}

pub struct ReminderScheduler<R = StdRng> {
    policy: SchedulePolicy,
    messages: MessagePicker<R>,
}

impl<R: Rng> ReminderScheduler<R> {
    pub fn new(policy: SchedulePolicy, messages: MessagePicker<R>) -> Self {
        Self { policy, messages }
    }

    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// 让已排期的通知与活动提醒一致
    pub fn sync(
        &mut self,
        reminders: &[Reminder],
        now: DateTime<Utc>,
        service: &mut dyn NotificationService,
    ) -> Result<SyncReport, NotifyError> {
        let pending = service.list_pending()?;
        let existing: HashMap<&str, &PendingNotification> = pending
            .iter()
            .map(|p| (p.intent.id.as_str(), p))
            .collect();
        let active: HashSet<&str> = reminders.iter().map(|r| r.identifier.as_str()).collect();

        let mut report = SyncReport::default();
        let mut stale = Vec::new();
        let mut expired = Vec::new();
        let mut wanted = Vec::new();

        for p in &pending {
            let (kind, owner) = NotificationKind::parse(&p.intent.id);
            match kind {
                NotificationKind::BackgroundPause => {}
                NotificationKind::RepeatingMotivational if active.is_empty() => {
                    stale.push(p.intent.id.clone())
                }
                _ if !active.contains(owner) => stale.push(p.intent.id.clone()),
                _ => {}
            }
        }

        for reminder in reminders {
            if reminder.is_overdue(now) {
                for kind in [NotificationKind::Initial, NotificationKind::Overdue] {
                    let id = kind.key(&reminder.identifier);
                    if existing.contains_key(id.as_str()) {
                        expired.push(id);
                    }
                }
                let trigger = Trigger::Every {
                    seconds: self.policy.motivational_every_secs,
                };
                let id = NotificationKind::RepeatingMotivational.key(&reminder.identifier);
                if matches_trigger(&existing, &id, &trigger) {
                    report.unchanged += 1;
                } else {
                    wanted.push(self.motivational(reminder, trigger));
                }
            } else {
                let id = NotificationKind::RepeatingMotivational.key(&reminder.identifier);
                if existing.contains_key(id.as_str()) {
                    expired.push(id);
                }

                let initial = Trigger::At {
                    fire_at: reminder.due_at,
                };
                if matches_trigger(&existing, &reminder.identifier, &initial) {
                    report.unchanged += 1;
                } else {
                    wanted.push(initial_intent(reminder, initial));
                }

                let overdue = Trigger::At {
                    fire_at: reminder.due_at + self.overdue_delay(),
                };
                let id = NotificationKind::Overdue.key(&reminder.identifier);
                if matches_trigger(&existing, &id, &overdue) {
                    report.unchanged += 1;
                } else {
                    wanted.push(self.overdue(reminder, overdue));
                }
            }
        }

        if !stale.is_empty() {
            info!(count = stale.len(), "sweeping notifications without an active reminder");
            service.cancel_pending(&stale)?;
            service.cancel_delivered(&stale)?;
        }
        if !expired.is_empty() {
            service.cancel_pending(&expired)?;
        }
        report.cancelled = stale.len() + expired.len();

        for intent in &wanted {
            match service.schedule(intent) {
                Ok(()) => report.scheduled += 1,
                Err(e) => {
                    warn!(id = %intent.id, error = %e, "notification not scheduled");
                    report.failures.push(e.to_string());
                }
            }
        }

        debug!(
            scheduled = report.scheduled,
            cancelled = report.cancelled,
            unchanged = report.unchanged,
            "notification policy applied"
        );
        Ok(report)
    }

    /// 提醒完成或删除：取消它的所有通知（待发和已送达）
    pub fn forget(
        &mut self,
        identifier: &str,
        service: &mut dyn NotificationService,
    ) -> Result<(), NotifyError> {
        let ids = keys_for(identifier);
        service.cancel_pending(&ids)?;
        service.cancel_delivered(&ids)?;
        debug!(identifier, "cancelled reminder notifications");
        Ok(())
    }

    fn overdue_delay(&self) -> Duration {
        Duration::seconds(self.policy.overdue_after_secs.min(u64::from(u32::MAX)) as i64)
    }

    fn overdue(&mut self, reminder: &Reminder, trigger: Trigger) -> NotificationIntent {
        NotificationIntent {
            id: NotificationKind::Overdue.key(&reminder.identifier),
            kind: NotificationKind::Overdue,
            trigger,
            title: "Assignment Overdue!".to_string(),
            body: format!("{} is now overdue. {}", reminder.title, self.messages.pick()),
        }
    }

    fn motivational(&mut self, reminder: &Reminder, trigger: Trigger) -> NotificationIntent {
        NotificationIntent {
            id: NotificationKind::RepeatingMotivational.key(&reminder.identifier),
            kind: NotificationKind::RepeatingMotivational,
            trigger,
            title: "Still Procrastinating?".to_string(),
            body: format!("{} is overdue! {}", reminder.title, self.messages.pick()),
        }
    }
}

fn initial_intent(reminder: &Reminder, trigger: Trigger) -> NotificationIntent {
    NotificationIntent {
        id: NotificationKind::Initial.key(&reminder.identifier),
        kind: NotificationKind::Initial,
        trigger,
        title: reminder.title.clone(),
        body: format!("{} is due now.", reminder.title),
    }
}

fn matches_trigger(
    existing: &HashMap<&str, &PendingNotification>,
    id: &str,
    trigger: &Trigger,
) -> bool {
    existing
        .get(id)
        .is_some_and(|p| &p.intent.trigger == trigger)
}
