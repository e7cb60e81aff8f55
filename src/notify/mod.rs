//! 本地通知。
//!
//! [`NotificationService`] 是调度策略看到的系统通知服务：按 id 排期、取消、
//! 列出待发通知。桌面通知服务不能保存未来的请求，所以这里用
//! [`LocalNotificationCenter`] 把待发请求存进键值库，由守护进程到点后经
//! [`DesktopNotifier`] 弹出。

use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration, Utc};
use notify_rust::{Notification, Timeout};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::db::{keys, KeyValueStore};
use crate::error::{NotifyError, StoreError};
use crate::models::Phase;

pub mod messages;
pub mod scheduler;

pub use messages::{MessagePicker, MOTIVATIONAL_MESSAGES};
pub use scheduler::{ReminderScheduler, SchedulePolicy, SyncReport};

pub const BACKGROUND_PAUSE_ID: &str = "focus_background_pause";
const OVERDUE_SUFFIX: &str = "_overdue";
const MOTIVATIONAL_SUFFIX: &str = "_motivational";

/// 已送达记录的保留条数
const DELIVERED_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Initial,
    Overdue,
    RepeatingMotivational,
    BackgroundPause,
}

impl NotificationKind {
    pub const REMINDER_KINDS: [NotificationKind; 3] = [
        NotificationKind::Initial,
        NotificationKind::Overdue,
        NotificationKind::RepeatingMotivational,
    ];

    /// 某提醒对应的通知 id
    pub fn key(self, identifier: &str) -> String {
        match self {
            NotificationKind::Initial => identifier.to_string(),
            NotificationKind::Overdue => format!("{identifier}{OVERDUE_SUFFIX}"),
            NotificationKind::RepeatingMotivational => format!("{identifier}{MOTIVATIONAL_SUFFIX}"),
            NotificationKind::BackgroundPause => BACKGROUND_PAUSE_ID.to_string(),
        }
    }

    /// 从通知 id 还原类型和所属提醒
    pub fn parse(id: &str) -> (NotificationKind, &str) {
        if id == BACKGROUND_PAUSE_ID {
            (NotificationKind::BackgroundPause, id)
        } else if let Some(owner) = id.strip_suffix(OVERDUE_SUFFIX) {
            (NotificationKind::Overdue, owner)
        } else if let Some(owner) = id.strip_suffix(MOTIVATIONAL_SUFFIX) {
            (NotificationKind::RepeatingMotivational, owner)
        } else {
            (NotificationKind::Initial, id)
        }
    }
}

/// 一个提醒的全部通知 id
pub fn keys_for(identifier: &str) -> Vec<String> {
    NotificationKind::REMINDER_KINDS
        .iter()
        .map(|kind| kind.key(identifier))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    At { fire_at: DateTime<Utc> },
    Every { seconds: u64 },
}

impl Trigger {
    pub fn repeats(&self) -> bool {
        matches!(self, Trigger::Every { .. })
    }
}

/// 策略产出的通知意图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: String,
    pub kind: NotificationKind,
    pub trigger: Trigger,
    pub title: String,
    pub body: String,
}

impl NotificationIntent {
    /// 后台暂停提醒，立即发出
    pub fn background_pause(now: DateTime<Utc>) -> Self {
        Self {
            id: BACKGROUND_PAUSE_ID.to_string(),
            kind: NotificationKind::BackgroundPause,
            trigger: Trigger::At { fire_at: now },
            title: "Focus Timer Paused".to_string(),
            body: "Your focus session has been paused for 2 minutes. Return to continue!"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub intent: NotificationIntent,
    pub next_fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub delivered_at: DateTime<Utc>,
}

/// 系统通知服务
pub trait NotificationService {
    /// 同 id 的请求会被替换
    fn schedule(&mut self, intent: &NotificationIntent) -> Result<(), NotifyError>;
    fn cancel_pending(&mut self, ids: &[String]) -> Result<(), NotifyError>;
    fn cancel_delivered(&mut self, ids: &[String]) -> Result<(), NotifyError>;
    fn list_pending(&self) -> Result<Vec<PendingNotification>, NotifyError>;
}

/// 把到点的通知真正展示出来
pub trait Deliver {
    fn deliver(&mut self, intent: &NotificationIntent) -> Result<(), NotifyError>;
}

/// 桌面通知管理器
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }

    /// 发送阶段完成通知
    pub fn send_phase_complete(&self, finished: Phase, next: Phase) -> AnyResult<()> {
        let (summary, body) = match (finished, next) {
            (Phase::Focus, Phase::LongBreak) => (
                "Long Break Time!",
                "Amazing work! Take a well-deserved break and recharge.",
            ),
            (Phase::Focus, _) => (
                "Break Time!",
                "Amazing work! Take a well-deserved break and recharge.",
            ),
            _ => (
                "Focus Time!",
                "Break's over! Time to dive deep into focused work again.",
            ),
        };
        self.send_notification(summary, body)
    }

    /// 发送普通通知
    pub fn send_notification(&self, title: &str, body: &str) -> AnyResult<()> {
        Notification::new()
            .summary(title)
            .body(body)
            .timeout(Timeout::Milliseconds(5000))
            .show()?;
        Ok(())
    }
}

impl Deliver for DesktopNotifier {
    fn deliver(&mut self, intent: &NotificationIntent) -> Result<(), NotifyError> {
        let summary = match intent.kind {
            NotificationKind::Initial => format!("📅 {}", intent.title),
            _ => intent.title.clone(),
        };
        self.send_notification(&summary, &intent.body)
            .map_err(|e| NotifyError::Desktop(e.to_string()))
    }
}

/// 待发请求保存在键值库中的通知中心
pub struct LocalNotificationCenter<S> {
    store: S,
    clock: Arc<dyn Clock>,
    authorized: bool,
}

impl<S: KeyValueStore> LocalNotificationCenter<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            authorized: true,
        }
    }

    /// 关闭后所有排期请求都会被拒绝
    pub fn set_authorized(&mut self, authorized: bool) {
        self.authorized = authorized;
    }

    pub fn list_delivered(&self) -> Result<Vec<DeliveredNotification>, NotifyError> {
        self.load(keys::DELIVERED_NOTIFICATIONS)
    }

    /// 发出所有到点的通知，重复型重新排期；返回送达数量
    pub fn deliver_due(&mut self, sink: &mut dyn Deliver) -> Result<usize, NotifyError> {
        let now = self.clock.now();
        let mut pending: Vec<PendingNotification> = self.load(keys::PENDING_NOTIFICATIONS)?;
        let mut delivered: Vec<DeliveredNotification> = self.load(keys::DELIVERED_NOTIFICATIONS)?;
        let mut count = 0;

        for entry in pending.iter_mut().filter(|p| p.next_fire_at <= now) {
            match sink.deliver(&entry.intent) {
                Ok(()) => {
                    count += 1;
                    delivered.retain(|d| d.id != entry.intent.id);
                    delivered.push(DeliveredNotification {
                        id: entry.intent.id.clone(),
                        title: entry.intent.title.clone(),
                        body: entry.intent.body.clone(),
                        delivered_at: now,
                    });
                }
                Err(e) => warn!(id = %entry.intent.id, error = %e, "delivery failed"),
            }
            if let Trigger::Every { seconds } = entry.intent.trigger {
                let step = seconds.max(1) as i64;
                let behind = (now - entry.next_fire_at).num_seconds().max(0);
                entry.next_fire_at += Duration::seconds(step * (behind / step + 1));
            }
        }
        pending.retain(|p| p.intent.trigger.repeats() || p.next_fire_at > now);

        if delivered.len() > DELIVERED_HISTORY {
            let excess = delivered.len() - DELIVERED_HISTORY;
            delivered.drain(..excess);
        }
        self.save(keys::PENDING_NOTIFICATIONS, &pending)?;
        self.save(keys::DELIVERED_NOTIFICATIONS, &delivered)?;
        if count > 0 {
            debug!(count, "delivered notifications");
        }
        Ok(count)
    }

    fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, NotifyError> {
        match self.store.load(key)? {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(items) => Ok(items),
                Err(e) => {
                    warn!(key, error = %e, "discarding unreadable notification list");
                    Ok(Vec::new())
                }
            },
            None => Ok(Vec::new()),
        }
    }

    fn save<T: Serialize>(&mut self, key: &str, items: &[T]) -> Result<(), NotifyError> {
        let bytes = serde_json::to_vec(items).map_err(|source| StoreError::Codec {
            key: key.to_string(),
            source,
        })?;
        self.store.save(key, &bytes)?;
        Ok(())
    }
}

impl<S: KeyValueStore> NotificationService for LocalNotificationCenter<S> {
    fn schedule(&mut self, intent: &NotificationIntent) -> Result<(), NotifyError> {
        if !self.authorized {
            return Err(NotifyError::Declined {
                id: intent.id.clone(),
                reason: "notifications are not authorized".to_string(),
            });
        }
        let next_fire_at = match intent.trigger {
            Trigger::At { fire_at } => fire_at,
            Trigger::Every { seconds } => {
                self.clock.now() + Duration::seconds(seconds.max(1) as i64)
            }
        };
        let mut pending: Vec<PendingNotification> = self.load(keys::PENDING_NOTIFICATIONS)?;
        pending.retain(|p| p.intent.id != intent.id);
        pending.push(PendingNotification {
            intent: intent.clone(),
            next_fire_at,
        });
        debug!(id = %intent.id, kind = ?intent.kind, %next_fire_at, "scheduled");
        self.save(keys::PENDING_NOTIFICATIONS, &pending)
    }

    fn cancel_pending(&mut self, ids: &[String]) -> Result<(), NotifyError> {
        let mut pending: Vec<PendingNotification> = self.load(keys::PENDING_NOTIFICATIONS)?;
        let before = pending.len();
        pending.retain(|p| !ids.contains(&p.intent.id));
        if pending.len() != before {
            debug!(removed = before - pending.len(), "cancelled pending notifications");
            self.save(keys::PENDING_NOTIFICATIONS, &pending)?;
        }
        Ok(())
    }

    fn cancel_delivered(&mut self, ids: &[String]) -> Result<(), NotifyError> {
        let mut delivered: Vec<DeliveredNotification> = self.load(keys::DELIVERED_NOTIFICATIONS)?;
        let before = delivered.len();
        delivered.retain(|d| !ids.contains(&d.id));
        if delivered.len() != before {
            self.save(keys::DELIVERED_NOTIFICATIONS, &delivered)?;
        }
        Ok(())
    }

    fn list_pending(&self) -> Result<Vec<PendingNotification>, NotifyError> {
        self.load(keys::PENDING_NOTIFICATIONS)
    }
}
