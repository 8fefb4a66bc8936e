use chrono::NaiveDate;

use crate::models::{CycleRecord, Phase};
use crate::policy::CyclePolicy;

/// Classify `date` into a cycle phase relative to the most recent cycle.
///
/// Total over its inputs: missing history, dates before the last recorded
/// start, and non-positive lengths all degrade to a defined phase.
pub fn classify(
    date: NaiveDate,
    most_recent: Option<&CycleRecord>,
    average_cycle_length: i64,
    average_period_length: i64,
    policy: &CyclePolicy,
) -> Phase {
    let Some(last) = most_recent else {
        return Phase::Follicular;
    };

    let cycle_length = policy.cycle_length_or_default(average_cycle_length);
    let period_length = policy.period_length_or_default(average_period_length);

    let days_since_start = (date - last.start_date).num_days();
    if days_since_start < 0 {
        return Phase::Follicular;
    }

    // Still bleeding: the open cycle wins over the projected cycle math.
    if last.is_open() && days_since_start < period_length {
        return Phase::Period;
    }

    phase_for_cycle_day(days_since_start % cycle_length, period_length, policy)
}

/// Phase of a zero-based day within a cycle.
pub fn phase_for_cycle_day(cycle_day: i64, period_length: i64, policy: &CyclePolicy) -> Phase {
    let follicular_end = period_length.saturating_add(policy.follicular_window_days);
    let ovulation_end = follicular_end.saturating_add(policy.ovulation_window_days);

    if cycle_day < period_length {
        Phase::Period
    } else if cycle_day < follicular_end {
        Phase::Follicular
    } else if cycle_day < ovulation_end {
        Phase::Ovulation
    } else {
        Phase::Luteal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Symptoms;
    use chrono::Duration;
    use proptest::prelude::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    fn closed_cycle() -> CycleRecord {
        let mut cycle = CycleRecord::new(start(), Symptoms::default(), None);
        cycle.end_date = Some(start() + Duration::days(4));
        cycle
    }

    fn phase_at(cycle: &CycleRecord, offset: i64) -> Phase {
        classify(
            start() + Duration::days(offset),
            Some(cycle),
            28,
            5,
            &CyclePolicy::default(),
        )
    }

    #[test]
    fn no_history_is_follicular() {
        let phase = classify(start(), None, 28, 5, &CyclePolicy::default());
        assert_eq!(phase, Phase::Follicular);
    }

    #[test]
    fn dates_before_last_start_are_follicular() {
        assert_eq!(phase_at(&closed_cycle(), -1), Phase::Follicular);
        assert_eq!(phase_at(&closed_cycle(), -40), Phase::Follicular);
    }

    #[test]
    fn phase_boundaries() {
        let cycle = closed_cycle();
        assert_eq!(phase_at(&cycle, 0), Phase::Period);
        assert_eq!(phase_at(&cycle, 4), Phase::Period);
        assert_eq!(phase_at(&cycle, 5), Phase::Follicular);
        assert_eq!(phase_at(&cycle, 11), Phase::Follicular);
        assert_eq!(phase_at(&cycle, 12), Phase::Ovulation);
        assert_eq!(phase_at(&cycle, 14), Phase::Ovulation);
        assert_eq!(phase_at(&cycle, 15), Phase::Luteal);
        assert_eq!(phase_at(&cycle, 27), Phase::Luteal);
    }

    #[test]
    fn cycle_wraps_around() {
        let cycle = closed_cycle();
        assert_eq!(phase_at(&cycle, 28), Phase::Period);
        assert_eq!(phase_at(&cycle, 28 + 13), Phase::Ovulation);
    }

    #[test]
    fn open_cycle_stays_in_period() {
        let open = CycleRecord::new(start(), Symptoms::default(), None);
        let policy = CyclePolicy::default();
        let date = start() + Duration::days(3);
        assert_eq!(classify(date, Some(&open), 2, 5, &policy), Phase::Period);
        assert_eq!(classify(date, Some(&open), 28, 5, &policy), Phase::Period);
        assert_eq!(
            classify(start() + Duration::days(5), Some(&open), 28, 5, &policy),
            Phase::Follicular
        );
    }

    #[test]
    fn zero_cycle_length_uses_default() {
        let cycle = closed_cycle();
        let date = start() + Duration::days(28);
        let phase = classify(date, Some(&cycle), 0, 5, &CyclePolicy::default());
        assert_eq!(phase, Phase::Period);
    }

    #[test]
    fn window_offsets_follow_period_length() {
        let cycle = closed_cycle();
        let policy = CyclePolicy::default();
        let date = |d| start() + Duration::days(d);
        assert_eq!(classify(date(7), Some(&cycle), 30, 7, &policy), Phase::Follicular);
        assert_eq!(classify(date(14), Some(&cycle), 30, 7, &policy), Phase::Ovulation);
        assert_eq!(classify(date(17), Some(&cycle), 30, 7, &policy), Phase::Luteal);
    }

    #[test]
    fn extreme_lengths_still_classify() {
        let cycle = closed_cycle();
        let policy = CyclePolicy::default();
        let date = start() + Duration::days(400);
        assert_eq!(classify(date, Some(&cycle), i64::MAX, i64::MAX, &policy), Phase::Period);
        assert_eq!(phase_for_cycle_day(3, i64::MAX, &policy), Phase::Period);
        assert_eq!(phase_for_cycle_day(i64::MAX, 5, &policy), Phase::Luteal);
    }

    proptest! {
        #[test]
        fn classify_is_total(
            offset in -400i64..400,
            cycle_length in prop_oneof![-5i64..60, Just(i64::MAX)],
            period_length in prop_oneof![-5i64..15, Just(i64::MAX)],
            open in any::<bool>(),
            with_history in any::<bool>(),
        ) {
            let mut cycle = CycleRecord::new(start(), Symptoms::default(), None);
            if !open {
                cycle.end_date = Some(start());
            }
            let history = if with_history { Some(&cycle) } else { None };
            let date = start() + Duration::days(offset);

            let phase = classify(date, history, cycle_length, period_length, &CyclePolicy::default());
            prop_assert!(matches!(
                phase,
                Phase::Period | Phase::Follicular | Phase::Ovulation | Phase::Luteal
            ));
            if offset < 0 || !with_history {
                prop_assert_eq!(phase, Phase::Follicular);
            }
        }
    }
}
