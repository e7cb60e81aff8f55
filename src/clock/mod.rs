//! 时钟抽象与节拍驱动。
//!
//! 只有这里知道真实流逝的秒数；状态机通过 [`Clock`] 取时间，
//! 界面层通过 [`TickDriver`] 决定何时调用 `tick()`。

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use std::sync::Mutex;
use std::time::{Duration as StdDuration, Instant};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// 当前日历日（本地时区）
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟，日历日按 UTC 计算
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// 每秒节拍。按单调时钟累计，落后时一次补齐多个节拍。
#[derive(Debug)]
pub struct TickDriver {
    period: StdDuration,
    next: Option<Instant>,
}

impl TickDriver {
    pub fn new(period: StdDuration) -> Self {
        Self { period, next: None }
    }

    pub fn every_second() -> Self {
        Self::new(StdDuration::from_secs(1))
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn start(&mut self, now: Instant) {
        if self.next.is_none() {
            self.next = Some(now + self.period);
        }
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    /// 返回到 `now` 为止应发出的节拍数
    pub fn due(&mut self, now: Instant) -> u32 {
        let Some(mut next) = self.next else {
            return 0;
        };
        let mut ticks = 0;
        while next <= now {
            ticks += 1;
            next += self.period;
        }
        self.next = Some(next);
        ticks
    }
}
