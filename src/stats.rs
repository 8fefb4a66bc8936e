use crate::models::{CycleRecord, CycleSettings, CycleStats};
use crate::policy::CyclePolicy;

/// Gaps in days between consecutive cycle starts, most recent first.
///
/// `cycles` must be sorted by start date descending. Gaps outside
/// `(0, max_cycle_gap_days)` are dropped as data-entry artifacts or outliers.
pub fn cycle_gaps(cycles: &[CycleRecord], policy: &CyclePolicy) -> Vec<i64> {
    cycles
        .windows(2)
        .map(|w| (w[0].start_date - w[1].start_date).num_days())
        .filter(|&gap| gap > 0 && gap < policy.max_cycle_gap_days)
        .collect()
}

/// Average cycle length from history, floored to whole days.
///
/// Returns `fallback` unchanged when there are fewer than two records or no
/// usable gap between them.
pub fn average_cycle_length(cycles: &[CycleRecord], fallback: i64, policy: &CyclePolicy) -> i64 {
    if cycles.len() < 2 {
        return fallback;
    }

    let gaps = cycle_gaps(cycles, policy);
    if gaps.is_empty() {
        return fallback;
    }

    gaps.iter().sum::<i64>() / gaps.len() as i64
}

/// Compute cycle statistics for the stats view.
pub fn cycle_stats(
    cycles: &[CycleRecord],
    settings: &CycleSettings,
    policy: &CyclePolicy,
) -> CycleStats {
    let gaps = cycle_gaps(cycles, policy);
    let last = cycles.first();

    CycleStats {
        total_cycles: cycles.len(),
        average_cycle_length: average_cycle_length(
            cycles,
            policy.cycle_length_or_default(settings.average_cycle_length),
            policy,
        ),
        average_period_length: policy.period_length_or_default(settings.average_period_length),
        shortest_cycle: gaps.iter().copied().min(),
        longest_cycle: gaps.iter().copied().max(),
        last_period_start: last.map(|c| c.start_date),
        last_period_end: last.and_then(|c| c.end_date),
    }
}

/// The `n` most recent cycles.
pub fn recent_cycles(cycles: &[CycleRecord], n: usize) -> &[CycleRecord] {
    &cycles[..cycles.len().min(n)]
}
