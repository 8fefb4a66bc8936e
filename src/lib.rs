//! Cycle tracking core: statistics, phase classification, predictions and
//! reminder scheduling over a pluggable record store.

pub mod calendar;
pub mod crypto;
pub mod models;
pub mod phase;
pub mod policy;
pub mod prediction;
pub mod reminders;
pub mod stats;
pub mod store;
pub mod tracker;

pub use models::{CycleRecord, CycleSettings, CycleStats, Phase, Predictions, Symptoms};
pub use policy::CyclePolicy;
pub use store::{EncryptedFileStore, MemoryStore, RecordStore, StoreError};
pub use tracker::{NewCycle, Tracker, TrackerError};
