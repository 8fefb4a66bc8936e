//! Cycle tracking over a record store.
//!
//! Every mutating operation writes through to the store and then re-runs the
//! pipeline explicitly: reload the snapshot, recompute the average cycle
//! length (written back when it changed), predict, and hand a fresh reminder
//! plan to the scheduler. Read operations only look at the cached snapshot.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::calendar::{self, MonthOverview};
use crate::models::{
    shift_days, CycleRecord, CycleSettings, CycleStats, Phase, Predictions, Symptoms,
};
use crate::phase;
use crate::policy::CyclePolicy;
use crate::prediction;
use crate::reminders::{self, ReminderScheduler, ScheduleReport};
use crate::stats;
use crate::store::{RecordStore, StoreError};

/// Source of the current local time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("no cycle is currently open")]
    NoOpenCycle,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inputs for starting a cycle.
#[derive(Debug, Clone, Default)]
pub struct NewCycle {
    /// Defaults to today.
    pub start_date: Option<NaiveDate>,
    pub symptoms: Symptoms,
    pub notes: Option<String>,
}

/// What [`Tracker::toggle_day`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum DayToggle {
    /// A single-day record was created.
    Marked(CycleRecord),
    /// The records covering the day were deleted.
    Cleared(Vec<Uuid>),
}

/// Derived state the read side works from.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Most recent start first.
    pub cycles: Vec<CycleRecord>,
    pub settings: CycleSettings,
    pub predictions: Predictions,
}

pub struct Tracker<S: RecordStore> {
    store: S,
    policy: CyclePolicy,
    scheduler: Option<ReminderScheduler>,
    clock: Clock,
    snapshot: Snapshot,
    pending_dispatch: Option<JoinHandle<ScheduleReport>>,
}

impl<S: RecordStore> Tracker<S> {
    /// Load the store and compute the initial snapshot. No reminders are
    /// dispatched until a scheduler is attached.
    pub fn new(store: S, policy: CyclePolicy) -> Result<Self, TrackerError> {
        let mut tracker = Self {
            store,
            policy,
            scheduler: None,
            clock: Arc::new(|| chrono::Local::now().naive_local()),
            snapshot: Snapshot::default(),
            pending_dispatch: None,
        };
        tracker.refresh()?;
        Ok(tracker)
    }

    pub fn with_scheduler(mut self, scheduler: ReminderScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn today(&self) -> NaiveDate {
        (self.clock)().date()
    }

    /// Re-run statistics, predictions and reminder scheduling.
    pub fn refresh(&mut self) -> Result<&Predictions, TrackerError> {
        let cycles = self.store.list_cycles()?;
        let settings = self.store.get_settings()?;
        let forecast = prediction::forecast(&cycles, &settings, &self.policy);

        if forecast.average_changed {
            match self.store.upsert_settings(forecast.settings.clone()) {
                Ok(()) => tracing::debug!(
                    average_cycle_length = forecast.settings.average_cycle_length,
                    "average cycle length updated"
                ),
                Err(e) => tracing::warn!(error = %e, "failed to store recomputed average"),
            }
        }

        tracing::debug!(
            cycles = cycles.len(),
            next_period = ?forecast.predictions.next_period,
            next_ovulation = ?forecast.predictions.next_ovulation,
            "predictions recomputed"
        );

        self.snapshot = Snapshot {
            cycles,
            settings: forecast.settings,
            predictions: forecast.predictions,
        };
        self.reschedule_reminders();
        Ok(&self.snapshot.predictions)
    }

    /// Replace pending reminders with a plan for the current predictions.
    /// Disabled reminders still cancel whatever is pending.
    pub fn reschedule_reminders(&mut self) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        let plan = if self.snapshot.settings.reminders_enabled {
            reminders::plan_reminders(&self.snapshot.predictions, (self.clock)(), &self.policy)
        } else {
            Vec::new()
        };
        tracing::debug!(reminders = plan.len(), "dispatching reminder plan");
        self.pending_dispatch = scheduler.dispatch(plan);
    }

    /// Handle of the most recent reminder dispatch, if one is still owned.
    pub fn take_pending_dispatch(&mut self) -> Option<JoinHandle<ScheduleReport>> {
        self.pending_dispatch.take()
    }

    // Write-through helpers. None of them refresh.

    fn close(&mut self, mut cycle: CycleRecord, end: NaiveDate) -> Result<CycleRecord, TrackerError> {
        if end < cycle.start_date {
            return Err(TrackerError::EndBeforeStart {
                start: cycle.start_date,
                end,
            });
        }
        cycle.end_date = Some(end);
        self.store.update_cycle(cycle.clone())?;
        Ok(cycle)
    }

    fn open(&mut self, new: NewCycle) -> Result<CycleRecord, TrackerError> {
        let start = new.start_date.unwrap_or_else(|| self.today());

        let open: Vec<CycleRecord> = self
            .store
            .list_cycles()?
            .into_iter()
            .filter(CycleRecord::is_open)
            .collect();
        for cycle in open {
            let end = shift_days(start, -1).unwrap_or(start).max(cycle.start_date);
            tracing::debug!(id = %cycle.id, %end, "closing previous open cycle");
            self.close(cycle, end)?;
        }

        let cycle = CycleRecord::new(start, new.symptoms, new.notes);
        self.store.insert_cycle(cycle.clone())?;
        Ok(cycle)
    }

    fn edit_symptoms(
        &mut self,
        mut cycle: CycleRecord,
        symptoms: Symptoms,
        notes: Option<String>,
    ) -> Result<CycleRecord, TrackerError> {
        cycle.symptoms = symptoms.clamped();
        cycle.notes = notes.filter(|n| !n.trim().is_empty());
        self.store.update_cycle(cycle.clone())?;
        Ok(cycle)
    }

    // Mutations

    /// Start a cycle, closing any open one the day before.
    pub fn start_cycle(&mut self, new: NewCycle) -> Result<CycleRecord, TrackerError> {
        let cycle = self.open(new)?;
        tracing::info!(id = %cycle.id, start = %cycle.start_date, "cycle started");
        self.refresh()?;
        Ok(cycle)
    }

    /// Close a cycle. `end` defaults to today.
    pub fn end_cycle(&mut self, id: Uuid, end: Option<NaiveDate>) -> Result<CycleRecord, TrackerError> {
        let end = end.unwrap_or_else(|| self.today());
        let cycle = self.store.get_cycle(id)?;
        let cycle = self.close(cycle, end)?;
        tracing::info!(id = %cycle.id, %end, "cycle ended");
        self.refresh()?;
        Ok(cycle)
    }

    pub fn end_current_cycle(&mut self, end: Option<NaiveDate>) -> Result<CycleRecord, TrackerError> {
        let id = self.current_cycle().ok_or(TrackerError::NoOpenCycle)?.id;
        self.end_cycle(id, end)
    }

    /// Mark or unmark a single day.
    ///
    /// A day that any record covers is cleared by deleting those records.
    /// Otherwise a one-day record (`start_date == end_date`) is created.
    pub fn toggle_day(&mut self, date: NaiveDate) -> Result<DayToggle, TrackerError> {
        let covering: Vec<Uuid> = self
            .store
            .list_cycles()?
            .iter()
            .filter(|c| c.covers(date))
            .map(|c| c.id)
            .collect();

        let outcome = if covering.is_empty() {
            let cycle = self.open(NewCycle {
                start_date: Some(date),
                ..NewCycle::default()
            })?;
            let cycle = self.close(cycle, date)?;
            tracing::info!(%date, "day marked");
            DayToggle::Marked(cycle)
        } else {
            for id in &covering {
                self.store.delete_cycle(*id)?;
            }
            tracing::info!(%date, removed = covering.len(), "day cleared");
            DayToggle::Cleared(covering)
        };

        self.refresh()?;
        Ok(outcome)
    }

    /// Record symptoms for a day: updates the cycle starting that day, or
    /// starts one there.
    pub fn log_symptoms(
        &mut self,
        date: NaiveDate,
        symptoms: Symptoms,
        notes: Option<String>,
    ) -> Result<CycleRecord, TrackerError> {
        let existing = self
            .store
            .list_cycles()?
            .into_iter()
            .find(|c| c.start_date == date);

        let cycle = match existing {
            Some(cycle) => self.edit_symptoms(cycle, symptoms, notes)?,
            None => self.open(NewCycle {
                start_date: Some(date),
                symptoms,
                notes,
            })?,
        };
        tracing::info!(id = %cycle.id, %date, "symptoms logged");
        self.refresh()?;
        Ok(cycle)
    }

    pub fn update_symptoms(
        &mut self,
        id: Uuid,
        symptoms: Symptoms,
        notes: Option<String>,
    ) -> Result<CycleRecord, TrackerError> {
        let cycle = self.store.get_cycle(id)?;
        let cycle = self.edit_symptoms(cycle, symptoms, notes)?;
        self.refresh()?;
        Ok(cycle)
    }

    pub fn delete_cycle(&mut self, id: Uuid) -> Result<(), TrackerError> {
        self.store.delete_cycle(id)?;
        tracing::info!(%id, "cycle deleted");
        self.refresh()?;
        Ok(())
    }

    /// Override the average lengths. Values are bounded by the policy, as in
    /// [`CyclePolicy::cycle_length_or_default`]. The cycle length is recomputed from history right
    /// away, so the override only sticks while history is too thin.
    pub fn update_settings(
        &mut self,
        cycle_length: i64,
        period_length: i64,
    ) -> Result<CycleSettings, TrackerError> {
        let mut settings = self.store.get_settings()?;
        settings.average_cycle_length = self.policy.cycle_length_or_default(cycle_length);
        settings.average_period_length = self.policy.period_length_or_default(period_length);
        self.store.upsert_settings(settings)?;
        self.refresh()?;
        Ok(self.snapshot.settings.clone())
    }

    pub fn set_reminders(
        &mut self,
        enabled: bool,
        days_before: Option<i64>,
    ) -> Result<CycleSettings, TrackerError> {
        let mut settings = self.store.get_settings()?;
        settings.reminders_enabled = enabled;
        if let Some(days) = days_before {
            settings.reminder_days_before = days.max(0);
        }
        self.store.upsert_settings(settings)?;
        self.refresh()?;
        Ok(self.snapshot.settings.clone())
    }

    // Reads

    pub fn policy(&self) -> &CyclePolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn cycles(&self) -> &[CycleRecord] {
        &self.snapshot.cycles
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.snapshot.settings
    }

    pub fn predictions(&self) -> Predictions {
        self.snapshot.predictions
    }

    /// The open cycle, if any.
    pub fn current_cycle(&self) -> Option<&CycleRecord> {
        self.snapshot.cycles.iter().find(|c| c.is_open())
    }

    pub fn classify(&self, date: NaiveDate) -> Phase {
        phase::classify(
            date,
            self.snapshot.cycles.first(),
            self.snapshot.settings.average_cycle_length,
            self.snapshot.settings.average_period_length,
            &self.policy,
        )
    }

    pub fn stats(&self) -> CycleStats {
        stats::cycle_stats(&self.snapshot.cycles, &self.snapshot.settings, &self.policy)
    }

    pub fn recent_cycles(&self, n: usize) -> &[CycleRecord] {
        stats::recent_cycles(&self.snapshot.cycles, n)
    }

    /// Cycles starting in the given month, oldest first. Empty for an invalid month.
    pub fn cycles_in_month(&self, year: i32, month: u32) -> Result<Vec<CycleRecord>, TrackerError> {
        let Some((start, end)) = calendar::month_bounds(year, month) else {
            return Ok(Vec::new());
        };
        Ok(self.store.list_cycles_in_range(start, end)?)
    }

    pub fn month(&self, year: i32, month: u32) -> Option<MonthOverview> {
        calendar::month_overview(
            year,
            month,
            &self.snapshot.cycles,
            &self.snapshot.settings,
            &self.snapshot.predictions,
            &self.policy,
        )
    }

    pub fn export_json(&self) -> Result<String, TrackerError> {
        let data = self.store.snapshot()?;
        Ok(serde_json::to_string_pretty(&data)?)
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
