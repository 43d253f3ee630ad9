use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why the table pauses after an announcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseCategory {
    Morning,
    VictimReveal,
    NoVictim,
    Lynch,
}

/// Pacing for public announcements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NarrationTiming {
    pub chars_per_second: f64,
    pub min_duration: Duration,
    pub buffer: Duration,
    /// Longer messages get no duration hint; they are narrated out of band.
    pub char_ceiling: usize,
    pub morning_pause: Duration,
    pub victim_pause: Duration,
    pub no_victim_pause: Duration,
    pub lynch_pause: Duration,
}

impl Default for NarrationTiming {
    fn default() -> Self {
        Self {
            chars_per_second: 15.0,
            min_duration: Duration::from_secs(2),
            buffer: Duration::from_millis(500),
            char_ceiling: 600,
            morning_pause: Duration::from_millis(1_500),
            victim_pause: Duration::from_millis(3_000),
            no_victim_pause: Duration::from_millis(2_000),
            lynch_pause: Duration::from_millis(3_000),
        }
    }
}

impl NarrationTiming {
    /// How long narrating `text` should take, clamped to the minimum and padded by the buffer.
    pub fn duration_hint(&self, text: &str) -> Option<Duration> {
        let chars = text.chars().count();
        if chars > self.char_ceiling {
            return None;
        }
        let spoken = if self.chars_per_second > 0.0 {
            Duration::from_secs_f64(chars as f64 / self.chars_per_second)
        } else {
            Duration::ZERO
        };
        Some(spoken.max(self.min_duration) + self.buffer)
    }

    pub fn pause(&self, category: PauseCategory) -> Duration {
        match category {
            PauseCategory::Morning => self.morning_pause,
            PauseCategory::VictimReveal => self.victim_pause,
            PauseCategory::NoVictim => self.no_victim_pause,
            PauseCategory::Lynch => self.lynch_pause,
        }
    }

    /// Total time progression is held after announcing `text`.
    pub fn hold(&self, text: &str, category: Option<PauseCategory>) -> Duration {
        self.duration_hint(text).unwrap_or_default() + category.map_or(Duration::ZERO, |c| self.pause(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_clamped_to_the_minimum() {
        let timing = NarrationTiming::default();
        assert_eq!(
            timing.duration_hint("Dawn."),
            Some(Duration::from_millis(2_500))
        );
    }

    #[test]
    fn duration_scales_with_length() {
        let timing = NarrationTiming::default();
        let text = "x".repeat(150);
        assert_eq!(timing.duration_hint(&text), Some(Duration::from_millis(10_500)));
    }

    #[test]
    fn messages_over_the_ceiling_get_no_hint() {
        let timing = NarrationTiming {
            char_ceiling: 10,
            ..NarrationTiming::default()
        };
        assert_eq!(timing.duration_hint("a long announcement"), None);
        assert_eq!(
            timing.hold("a long announcement", Some(PauseCategory::Lynch)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn hold_adds_category_pause() {
        let timing = NarrationTiming::default();
        assert_eq!(
            timing.hold("Dawn.", Some(PauseCategory::Morning)),
            Duration::from_millis(4_000)
        );
        assert_eq!(timing.hold("Dawn.", None), Duration::from_millis(2_500));
    }
}
