//! Reminder planning and delivery.
//!
//! Planning is a pure function of the predictions and the current time.
//! Delivery goes through the [`Notifier`] port: every dispatch cancels all
//! pending reminders and then submits the new plan, one independent task per
//! reminder, so a failed submission never blocks the others.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};

use crate::models::{shift_days, Predictions};
use crate::policy::CyclePolicy;

/// Stable reminder identifiers. Scheduling the same id again replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReminderId {
    #[serde(rename = "periodReminder3Days")]
    PeriodInThreeDays,
    #[serde(rename = "periodReminder1Day")]
    PeriodTomorrow,
    #[serde(rename = "periodReminderToday")]
    PeriodToday,
    #[serde(rename = "ovulationReminder1Day")]
    OvulationTomorrow,
    #[serde(rename = "ovulationReminderToday")]
    OvulationToday,
}

impl ReminderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderId::PeriodInThreeDays => "periodReminder3Days",
            ReminderId::PeriodTomorrow => "periodReminder1Day",
            ReminderId::PeriodToday => "periodReminderToday",
            ReminderId::OvulationTomorrow => "ovulationReminder1Day",
            ReminderId::OvulationToday => "ovulationReminderToday",
        }
    }
}

impl std::fmt::Display for ReminderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Period,
    Ovulation,
}

struct ReminderRule {
    id: ReminderId,
    anchor: Anchor,
    offset_days: i64,
    title: &'static str,
    body: &'static str,
}

const RULES: [ReminderRule; 5] = [
    ReminderRule {
        id: ReminderId::PeriodInThreeDays,
        anchor: Anchor::Period,
        offset_days: -3,
        title: "Period reminder",
        body: "Your period is expected in 3 days",
    },
    ReminderRule {
        id: ReminderId::PeriodTomorrow,
        anchor: Anchor::Period,
        offset_days: -1,
        title: "Period reminder",
        body: "Your period is expected tomorrow",
    },
    ReminderRule {
        id: ReminderId::PeriodToday,
        anchor: Anchor::Period,
        offset_days: 0,
        title: "Menstruation",
        body: "Your period is expected today",
    },
    ReminderRule {
        id: ReminderId::OvulationTomorrow,
        anchor: Anchor::Ovulation,
        offset_days: -1,
        title: "Ovulation reminder",
        body: "Ovulation is expected tomorrow",
    },
    ReminderRule {
        id: ReminderId::OvulationToday,
        anchor: Anchor::Ovulation,
        offset_days: 0,
        title: "Ovulation phase",
        body: "Ovulation is expected today",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRequest {
    pub id: ReminderId,
    pub title: String,
    pub body: String,
    /// Local wall-clock time the reminder should fire.
    pub fire_at: NaiveDateTime,
}

/// Reminders to schedule for `predictions`, keeping only those that fire
/// strictly after `now`.
pub fn plan_reminders(
    predictions: &Predictions,
    now: NaiveDateTime,
    policy: &CyclePolicy,
) -> Vec<ReminderRequest> {
    RULES
        .iter()
        .filter_map(|rule| {
            let (anchor, hour) = match rule.anchor {
                Anchor::Period => (predictions.next_period?, policy.period_reminder_hour),
                Anchor::Ovulation => (predictions.next_ovulation?, policy.ovulation_reminder_hour),
            };
            let fire_at = fire_time(shift_days(anchor, rule.offset_days)?, hour)?;
            (fire_at > now).then(|| ReminderRequest {
                id: rule.id,
                title: rule.title.to_string(),
                body: rule.body.to_string(),
                fire_at,
            })
        })
        .collect()
}

fn fire_time(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    date.and_hms_opt(hour, 0, 0)
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifications are not authorized")]
    NotAuthorized,
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// External notification delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Drop every pending reminder.
    async fn cancel_all(&self) -> Result<(), NotifyError>;

    /// Enqueue one reminder, replacing any pending reminder with the same id.
    async fn schedule(&self, request: ReminderRequest) -> Result<(), NotifyError>;
}

/// Notifier that keeps pending reminders in memory and logs each one.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    pending: Mutex<BTreeMap<ReminderId, ReminderRequest>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending reminders ordered by fire time.
    pub fn pending(&self) -> Vec<ReminderRequest> {
        let mut pending: Vec<ReminderRequest> = match self.pending.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        pending.sort_by_key(|r| r.fire_at);
        pending
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn cancel_all(&self) -> Result<(), NotifyError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        pending.clear();
        Ok(())
    }

    async fn schedule(&self, request: ReminderRequest) -> Result<(), NotifyError> {
        tracing::info!(id = %request.id, fire_at = %request.fire_at, "reminder scheduled");
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        pending.insert(request.id, request);
        Ok(())
    }
}

/// Outcome of one cancel-and-replace run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub scheduled: usize,
    pub failed: usize,
    /// A newer dispatch was issued before this one ran; nothing was touched.
    pub superseded: bool,
}

/// Cancel-and-replace delivery of reminder plans.
///
/// Each dispatch is stamped with a generation number. A dispatch that only
/// gets to run after a newer one was issued does nothing, so late tasks
/// never resurrect stale reminders.
#[derive(Clone)]
pub struct ReminderScheduler {
    notifier: Arc<dyn Notifier>,
    generation: Arc<AtomicU64>,
    running: Arc<tokio::sync::Mutex<()>>,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            generation: Arc::new(AtomicU64::new(0)),
            running: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace all pending reminders with `requests` and wait for the result.
    pub async fn replace_all(&self, requests: Vec<ReminderRequest>) -> ScheduleReport {
        let generation = self.next_generation();
        self.run(generation, requests).await
    }

    /// Fire-and-forget variant of [`replace_all`](Self::replace_all) on the
    /// current tokio runtime. Returns `None` when called outside a runtime.
    pub fn dispatch(&self, requests: Vec<ReminderRequest>) -> Option<JoinHandle<ScheduleReport>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime, reminders not dispatched");
                return None;
            }
        };
        let generation = self.next_generation();
        let scheduler = self.clone();
        Some(handle.spawn(async move { scheduler.run(generation, requests).await }))
    }

    async fn run(&self, generation: u64, requests: Vec<ReminderRequest>) -> ScheduleReport {
        let _running = self.running.lock().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, "reminder dispatch superseded");
            return ScheduleReport {
                superseded: true,
                ..ScheduleReport::default()
            };
        }

        if let Err(e) = self.notifier.cancel_all().await {
            tracing::warn!(error = %e, "failed to cancel pending reminders");
        }

        let mut tasks = JoinSet::new();
        for request in requests {
            let notifier = Arc::clone(&self.notifier);
            tasks.spawn(async move {
                let id = request.id;
                notifier.schedule(request).await.map_err(|e| (id, e))
            });
        }

        let mut report = ScheduleReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => report.scheduled += 1,
                Ok(Err((id, e))) => {
                    tracing::warn!(%id, error = %e, "failed to schedule reminder");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "reminder task aborted");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scheduled = report.scheduled,
            failed = report.failed,
            "reminders replaced"
        );
        report
    }
}
