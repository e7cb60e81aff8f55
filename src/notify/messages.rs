use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// 逾期提醒的固定消息池
pub const MOTIVATIONAL_MESSAGES: [&str; 12] = [
    "Whatever you want to do, do it now. There are only so many tomorrows.",
    "You need to stop watching TikTok and get off your bed to start your work!",
    "Stop being lazy and start doing your work!",
    "Things may come to those who wait, but only the things left by those who hustle.",
    "Never put off till tomorrow what may be done the day after tomorrow just as well.",
    "The future depends on what you do today!",
    "Success is the sum of small efforts repeated day in and day out.",
    "Don't wait for opportunity. Create it!",
    "Your future self is counting on you right now!",
    "Procrastination is the thief of time. Don't let it steal yours!",
    "The best time to start was yesterday. The second best time is now!",
    "You're stronger than your excuses!",
];

/// 从消息池均匀抽取；随机源可注入
#[derive(Debug)]
pub struct MessagePicker<R = StdRng> {
    rng: R,
}

impl MessagePicker<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> MessagePicker<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn pick(&mut self) -> &'static str {
        MOTIVATIONAL_MESSAGES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(MOTIVATIONAL_MESSAGES[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_picker_is_reproducible() {
        let mut a = MessagePicker::seeded(7);
        let mut b = MessagePicker::seeded(7);
        for _ in 0..20 {
            assert_eq!(a.pick(), b.pick());
        }
    }

    #[test]
    fn picks_come_from_the_pool() {
        let mut picker = MessagePicker::seeded(1);
        for _ in 0..50 {
            assert!(MOTIVATIONAL_MESSAGES.contains(&picker.pick()));
        }
    }
}
