use crate::models::{DurationSettings, Phase};

/// 决定下一个阶段及其时长，纯函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DurationPolicy {
    settings: DurationSettings,
}

impl DurationPolicy {
    pub fn new(settings: DurationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DurationSettings {
        &self.settings
    }

    pub fn seconds_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.settings.focus_seconds,
            Phase::ShortBreak => self.settings.short_break_seconds,
            Phase::LongBreak => self.settings.long_break_seconds,
        }
    }

    pub fn focus(&self) -> (Phase, u32) {
        (Phase::Focus, self.settings.focus_seconds)
    }

    /// 专注完成后的休息：第 N 的倍数次为长休息
    pub fn next_phase_duration(&self, completed_so_far: u32) -> (Phase, u32) {
        let every = self.settings.long_break_every_n_sessions.max(1);
        let phase = if completed_so_far > 0 && completed_so_far % every == 0 {
            Phase::LongBreak
        } else {
            Phase::ShortBreak
        };
        (phase, self.seconds_for(phase))
    }

    /// 某阶段结束后的下一阶段
    pub fn after(&self, finished: Phase, completed_so_far: u32) -> (Phase, u32) {
        match finished {
            Phase::Focus => self.next_phase_duration(completed_so_far),
            Phase::ShortBreak | Phase::LongBreak => self.focus(),
        }
    }
}
