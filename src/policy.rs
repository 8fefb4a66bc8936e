//! Tunable policy values used by the statistics, classifier, prediction and
//! reminder code. None of these are physiological constants.

use serde::{Deserialize, Serialize};

/// Upper bound of every symptom rating.
pub const RATING_MAX: u8 = 5;

pub const DEFAULT_CYCLE_LENGTH: i64 = 28;
pub const DEFAULT_PERIOD_LENGTH: i64 = 5;
/// Gaps between cycle starts at or above this are treated as outliers.
pub const MAX_CYCLE_GAP_DAYS: i64 = 50;
/// Upper bound for stored average cycle and period lengths.
pub const MAX_AVERAGE_LENGTH_DAYS: i64 = 365;
pub const FOLLICULAR_WINDOW_DAYS: i64 = 7;
pub const OVULATION_WINDOW_DAYS: i64 = 3;
/// Ovulation is predicted this many days before the next period.
pub const LUTEAL_OFFSET_DAYS: i64 = 14;
pub const PERIOD_REMINDER_HOUR: u32 = 9;
pub const OVULATION_REMINDER_HOUR: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclePolicy {
    pub default_cycle_length: i64,
    pub default_period_length: i64,
    pub max_cycle_gap_days: i64,
    pub max_average_length_days: i64,
    pub follicular_window_days: i64,
    pub ovulation_window_days: i64,
    pub luteal_offset_days: i64,
    pub period_reminder_hour: u32,
    pub ovulation_reminder_hour: u32,
}

impl CyclePolicy {
    /// Non-positive lengths fall back to the default, longer ones are capped
    /// at `max_average_length_days`.
    pub fn cycle_length_or_default(&self, length: i64) -> i64 {
        self.bounded(length, self.default_cycle_length)
    }

    pub fn period_length_or_default(&self, length: i64) -> i64 {
        self.bounded(length, self.default_period_length)
    }

    fn bounded(&self, length: i64, default: i64) -> i64 {
        let max = self.max_average_length_days.max(1);
        if length > 0 {
            length.min(max)
        } else {
            default.clamp(1, max)
        }
    }
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            default_cycle_length: DEFAULT_CYCLE_LENGTH,
            default_period_length: DEFAULT_PERIOD_LENGTH,
            max_cycle_gap_days: MAX_CYCLE_GAP_DAYS,
            max_average_length_days: MAX_AVERAGE_LENGTH_DAYS,
            follicular_window_days: FOLLICULAR_WINDOW_DAYS,
            ovulation_window_days: OVULATION_WINDOW_DAYS,
            luteal_offset_days: LUTEAL_OFFSET_DAYS,
            period_reminder_hour: PERIOD_REMINDER_HOUR,
            ovulation_reminder_hour: OVULATION_REMINDER_HOUR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_are_bounded_both_ways() {
        let policy = CyclePolicy::default();
        assert_eq!(policy.cycle_length_or_default(30), 30);
        assert_eq!(policy.cycle_length_or_default(0), DEFAULT_CYCLE_LENGTH);
        assert_eq!(policy.cycle_length_or_default(200_000_000), MAX_AVERAGE_LENGTH_DAYS);
        assert_eq!(policy.period_length_or_default(i64::MAX), MAX_AVERAGE_LENGTH_DAYS);
        assert_eq!(policy.period_length_or_default(i64::MIN), DEFAULT_PERIOD_LENGTH);
    }

    #[test]
    fn oversized_default_is_capped_too() {
        let policy = CyclePolicy {
            default_cycle_length: 10_000,
            max_average_length_days: 90,
            ..CyclePolicy::default()
        };
        assert_eq!(policy.cycle_length_or_default(-1), 90);
    }
}
