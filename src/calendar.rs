use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{shift_days, CycleRecord, CycleSettings, Phase, Predictions};
use crate::phase;
use crate::policy::CyclePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayInfo {
    pub date: NaiveDate,
    pub phase: Phase,
    /// A record marks this day as a bleeding day.
    pub marked: bool,
    pub predicted_period: bool,
    pub predicted_ovulation: bool,
}

/// Data returned to the calendar for a month view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthOverview {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st in a Monday-first week grid.
    pub leading_blanks: u32,
    pub days: Vec<DayInfo>,
}

/// First day of the month and first day of the following month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }?;
    Some((first, next))
}

/// Per-day phase and markings for one month. `cycles` must be sorted by
/// start date descending. Returns `None` for an invalid month.
pub fn month_overview(
    year: i32,
    month: u32,
    cycles: &[CycleRecord],
    settings: &CycleSettings,
    predictions: &Predictions,
    policy: &CyclePolicy,
) -> Option<MonthOverview> {
    let (first, next) = month_bounds(year, month)?;
    let period_length = policy.period_length_or_default(settings.average_period_length);
    let predicted_period = predictions
        .next_period
        .map(|start| start..shift_days(start, period_length).unwrap_or(NaiveDate::MAX));

    let days = first
        .iter_days()
        .take_while(|d| *d < next)
        .map(|date| DayInfo {
            date,
            phase: phase::classify(
                date,
                cycles.first(),
                settings.average_cycle_length,
                settings.average_period_length,
                policy,
            ),
            marked: cycles.iter().any(|c| c.covers(date)),
            predicted_period: predicted_period
                .as_ref()
                .is_some_and(|range| range.contains(&date)),
            predicted_ovulation: predictions.next_ovulation == Some(date),
        })
        .collect();

    Some(MonthOverview {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_monday(),
        days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Symptoms;
    use crate::prediction;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn invalid_month_is_none() {
        let overview = month_overview(
            2025,
            13,
            &[],
            &CycleSettings::default(),
            &Predictions::default(),
            &CyclePolicy::default(),
        );
        assert!(overview.is_none());
    }

    #[test]
    fn december_rolls_into_next_year() {
        let (first, next) = month_bounds(2025, 12).unwrap();
        assert_eq!(first, day("2025-12-01"));
        assert_eq!(next, day("2026-01-01"));
    }

    #[test]
    fn empty_history_is_all_follicular() {
        let overview = month_overview(
            2026,
            2,
            &[],
            &CycleSettings::default(),
            &Predictions::default(),
            &CyclePolicy::default(),
        )
        .unwrap();
        assert_eq!(overview.days.len(), 28);
        // 2026-02-01 is a Sunday.
        assert_eq!(overview.leading_blanks, 6);
        assert!(overview.days.iter().all(|d| d.phase == Phase::Follicular && !d.marked));
    }

    #[test]
    fn huge_period_length_does_not_overflow() {
        let policy = CyclePolicy::default();
        let settings = CycleSettings {
            average_period_length: i64::MAX,
            ..CycleSettings::default()
        };
        let cycles = vec![CycleRecord::new(day("2024-12-01"), Symptoms::default(), None)];
        let predictions = prediction::predict(&cycles, 28, &policy);

        let overview = month_overview(2025, 1, &cycles, &settings, &predictions, &policy).unwrap();
        assert_eq!(overview.days.len(), 31);
        // Predicted start is 2024-12-29 and the capped period covers January.
        assert!(overview.days.iter().all(|d| d.predicted_period));

        let edge = Predictions {
            next_period: Some(NaiveDate::MAX),
            next_ovulation: None,
        };
        assert!(month_overview(2025, 1, &cycles, &settings, &edge, &policy).is_some());
    }

    #[test]
    fn january_with_open_cycle() {
        let policy = CyclePolicy::default();
        let settings = CycleSettings::default();
        let cycles = vec![CycleRecord::new(day("2025-01-01"), Symptoms::default(), None)];
        let predictions = prediction::predict(&cycles, settings.average_cycle_length, &policy);

        let overview = month_overview(2025, 1, &cycles, &settings, &predictions, &policy).unwrap();
        let get = |n: usize| &overview.days[n - 1];

        assert_eq!(overview.days.len(), 31);
        assert!(get(1).marked);
        assert!(!get(2).marked);
        assert_eq!(get(3).phase, Phase::Period);
        assert_eq!(get(20).phase, Phase::Luteal);
        assert!(get(15).predicted_ovulation);
        assert!(get(29).predicted_period);
        assert!(get(31).predicted_period);
        assert!(!get(28).predicted_period);
    }
}
