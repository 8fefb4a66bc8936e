use crate::models::{shift_days, CycleRecord, CycleSettings, Predictions};
use crate::policy::CyclePolicy;
use crate::stats;

/// Result of re-running statistics and predictions over a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Settings with the recomputed average cycle length applied.
    pub settings: CycleSettings,
    pub predictions: Predictions,
    /// Whether the recomputed or clamped lengths differ from the stored ones
    /// and need to be written back.
    pub average_changed: bool,
}

/// Predict the next period and ovulation from the most recent cycle start.
///
/// `cycles` must be sorted by start date descending. A projection that
/// falls outside the supported date range is left empty.
pub fn predict(
    cycles: &[CycleRecord],
    average_cycle_length: i64,
    policy: &CyclePolicy,
) -> Predictions {
    let Some(last) = cycles.first() else {
        return Predictions::default();
    };

    let cycle_length = policy.cycle_length_or_default(average_cycle_length);
    let next_period = shift_days(last.start_date, cycle_length);
    let next_ovulation = next_period
        .and_then(|period| shift_days(period, policy.luteal_offset_days.saturating_neg()));

    Predictions {
        next_period,
        next_ovulation,
    }
}

/// Recompute the average cycle length from history, then predict with it.
pub fn forecast(cycles: &[CycleRecord], settings: &CycleSettings, policy: &CyclePolicy) -> Forecast {
    let current = settings.sanitized(policy);
    let average = stats::average_cycle_length(cycles, current.average_cycle_length, policy);

    let updated = CycleSettings {
        average_cycle_length: average,
        ..current
    };

    Forecast {
        average_changed: updated.average_cycle_length != settings.average_cycle_length
            || updated.average_period_length != settings.average_period_length,
        predictions: predict(cycles, average, policy),
        settings: updated,
    }
}
