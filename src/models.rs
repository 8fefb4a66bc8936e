use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{CyclePolicy, RATING_MAX};

/// Phase of the cycle a calendar date falls into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Period,
    Follicular,
    Ovulation,
    Luteal,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Period => "period",
            Phase::Follicular => "follicular",
            Phase::Ovulation => "ovulation",
            Phase::Luteal => "luteal",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported ratings attached to a cycle, each on a `0..=5` scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Symptoms {
    pub intensity: u8,
    pub mood: u8,
    pub energy: u8,
    pub pain: u8,
}

impl Symptoms {
    /// Clamp every rating onto the bounded scale.
    pub fn clamped(self) -> Self {
        Self {
            intensity: self.intensity.min(RATING_MAX),
            mood: self.mood.min(RATING_MAX),
            energy: self.energy.min(RATING_MAX),
            pain: self.pain.min(RATING_MAX),
        }
    }
}

impl Default for Symptoms {
    fn default() -> Self {
        Self {
            intensity: 2,
            mood: 3,
            energy: 3,
            pain: 0,
        }
    }
}

/// One menstrual cycle.
///
/// `end_date == None` is an open cycle. A record with `start_date == end_date`
/// is a single marked day (created by toggling a day in the calendar), which
/// the statistics treat like any other cycle start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleRecord {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub symptoms: Symptoms,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CycleRecord {
    pub fn new(start_date: NaiveDate, symptoms: Symptoms, notes: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date,
            end_date: None,
            symptoms: symptoms.clamped(),
            notes: notes.filter(|n| !n.trim().is_empty()),
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    pub fn is_single_day(&self) -> bool {
        self.end_date == Some(self.start_date)
    }

    /// Whether this record marks `date` as a bleeding day: it starts on that
    /// day, or it is closed and `[start, end]` contains it.
    pub fn covers(&self, date: NaiveDate) -> bool {
        if self.start_date == date {
            return true;
        }
        match self.end_date {
            Some(end) => self.start_date <= date && date <= end,
            None => false,
        }
    }
}

/// Per-user cycle configuration. There is exactly one per store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSettings {
    pub id: Uuid,
    pub average_cycle_length: i64,
    pub average_period_length: i64,
    pub reminders_enabled: bool,
    pub reminder_days_before: i64,
}

impl CycleSettings {
    pub fn with_policy(policy: &CyclePolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            average_cycle_length: policy.default_cycle_length,
            average_period_length: policy.default_period_length,
            reminders_enabled: true,
            reminder_days_before: 1,
        }
    }

    /// Settings with non-positive lengths replaced by the policy defaults.
    pub fn sanitized(&self, policy: &CyclePolicy) -> Self {
        Self {
            average_cycle_length: policy.cycle_length_or_default(self.average_cycle_length),
            average_period_length: policy.period_length_or_default(self.average_period_length),
            ..self.clone()
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::with_policy(&CyclePolicy::default())
    }
}

/// `date` shifted by `days`, or `None` if it leaves chrono's date range.
pub fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|delta| date.checked_add_signed(delta))
}

/// Next expected period start and ovulation day. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Predictions {
    pub next_period: Option<NaiveDate>,
    pub next_ovulation: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleStats {
    pub total_cycles: usize,
    pub average_cycle_length: i64,
    pub average_period_length: i64,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
}

/// Everything a record store persists.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreData {
    pub cycles: Vec<CycleRecord>,
    #[serde(default)]
    pub settings: Option<CycleSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn symptoms_are_clamped_on_creation() {
        let record = CycleRecord::new(
            day("2026-03-01"),
            Symptoms {
                intensity: 9,
                mood: 5,
                energy: 200,
                pain: 0,
            },
            None,
        );
        assert_eq!(record.symptoms.intensity, 5);
        assert_eq!(record.symptoms.mood, 5);
        assert_eq!(record.symptoms.energy, 5);
        assert!(record.is_open());
    }

    #[test]
    fn blank_notes_are_dropped() {
        let record = CycleRecord::new(day("2026-03-01"), Symptoms::default(), Some("  ".into()));
        assert_eq!(record.notes, None);
    }

    #[test]
    fn open_record_covers_only_its_start() {
        let record = CycleRecord::new(day("2026-03-01"), Symptoms::default(), None);
        assert!(record.covers(day("2026-03-01")));
        assert!(!record.covers(day("2026-03-02")));
    }

    #[test]
    fn closed_record_covers_its_range() {
        let mut record = CycleRecord::new(day("2026-03-01"), Symptoms::default(), None);
        record.end_date = Some(day("2026-03-05"));
        assert!(record.covers(day("2026-03-03")));
        assert!(record.covers(day("2026-03-05")));
        assert!(!record.covers(day("2026-03-06")));
        assert!(!record.covers(day("2026-02-28")));
        assert!(!record.is_single_day());
    }

    #[test]
    fn settings_sanitize_non_positive_lengths() {
        let policy = CyclePolicy::default();
        let settings = CycleSettings {
            average_cycle_length: 0,
            average_period_length: -2,
            ..CycleSettings::default()
        };
        let clean = settings.sanitized(&policy);
        assert_eq!(clean.average_cycle_length, 28);
        assert_eq!(clean.average_period_length, 5);
    }

    #[test]
    fn shift_days_stops_at_the_calendar_edge() {
        assert_eq!(shift_days(day("2026-01-30"), 3), Some(day("2026-02-02")));
        assert_eq!(shift_days(NaiveDate::MAX, 1), None);
        assert_eq!(shift_days(NaiveDate::MIN, -1), None);
        assert_eq!(shift_days(day("2026-01-30"), i64::MAX), None);
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Ovulation).unwrap(), "\"ovulation\"");
    }
}
