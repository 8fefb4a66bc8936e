use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, KdfParams};
use crate::models::{CycleRecord, CycleSettings, StoreData};
use crate::policy::CyclePolicy;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data directory not found")]
    NoDataDir,
    #[error("cycle {0} not found")]
    NotFound(Uuid),
}

/// Persistence for cycle records and the settings singleton.
///
/// Stores do not enforce the single-open-cycle rule; the tracker does.
pub trait RecordStore {
    /// All cycles, most recent start first.
    fn list_cycles(&self) -> Result<Vec<CycleRecord>, StoreError>;

    /// Cycles starting in `[start, end)`, oldest first.
    fn list_cycles_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CycleRecord>, StoreError> {
        let mut cycles: Vec<CycleRecord> = self
            .list_cycles()?
            .into_iter()
            .filter(|c| c.start_date >= start && c.start_date < end)
            .collect();
        cycles.reverse();
        Ok(cycles)
    }

    fn get_cycle(&self, id: Uuid) -> Result<CycleRecord, StoreError>;
    fn insert_cycle(&mut self, cycle: CycleRecord) -> Result<(), StoreError>;
    fn update_cycle(&mut self, cycle: CycleRecord) -> Result<(), StoreError>;
    fn delete_cycle(&mut self, id: Uuid) -> Result<(), StoreError>;

    /// The settings singleton, created with defaults if absent.
    fn get_settings(&mut self) -> Result<CycleSettings, StoreError>;
    fn upsert_settings(&mut self, settings: CycleSettings) -> Result<(), StoreError>;

    /// Full store contents for export.
    fn snapshot(&self) -> Result<StoreData, StoreError>;
}

fn sorted_desc(cycles: &[CycleRecord]) -> Vec<CycleRecord> {
    let mut sorted = cycles.to_vec();
    sorted.sort_by(|a, b| {
        b.start_date
            .cmp(&a.start_date)
            .then(b.created_at.cmp(&a.created_at))
    });
    sorted
}

fn apply_update(data: &mut StoreData, cycle: CycleRecord) -> Result<(), StoreError> {
    let existing = data
        .cycles
        .iter_mut()
        .find(|c| c.id == cycle.id)
        .ok_or(StoreError::NotFound(cycle.id))?;
    *existing = cycle;
    Ok(())
}

fn apply_delete(data: &mut StoreData, id: Uuid) -> Result<(), StoreError> {
    let before = data.cycles.len();
    data.cycles.retain(|c| c.id != id);
    if data.cycles.len() == before {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

fn find(data: &StoreData, id: Uuid) -> Result<CycleRecord, StoreError> {
    data.cycles
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .ok_or(StoreError::NotFound(id))
}

/// In-process store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: StoreData,
    policy: CyclePolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CyclePolicy) -> Self {
        Self {
            data: StoreData::default(),
            policy,
        }
    }
}

impl RecordStore for MemoryStore {
    fn list_cycles(&self) -> Result<Vec<CycleRecord>, StoreError> {
        Ok(sorted_desc(&self.data.cycles))
    }

    fn get_cycle(&self, id: Uuid) -> Result<CycleRecord, StoreError> {
        find(&self.data, id)
    }

    fn insert_cycle(&mut self, cycle: CycleRecord) -> Result<(), StoreError> {
        self.data.cycles.push(cycle);
        Ok(())
    }

    fn update_cycle(&mut self, cycle: CycleRecord) -> Result<(), StoreError> {
        apply_update(&mut self.data, cycle)
    }

    fn delete_cycle(&mut self, id: Uuid) -> Result<(), StoreError> {
        apply_delete(&mut self.data, id)
    }

    fn get_settings(&mut self) -> Result<CycleSettings, StoreError> {
        let policy = &self.policy;
        Ok(self
            .data
            .settings
            .get_or_insert_with(|| CycleSettings::with_policy(policy))
            .clone())
    }

    fn upsert_settings(&mut self, settings: CycleSettings) -> Result<(), StoreError> {
        self.data.settings = Some(settings);
        Ok(())
    }

    fn snapshot(&self) -> Result<StoreData, StoreError> {
        Ok(self.data.clone())
    }
}

/// Store kept in a single passphrase-sealed JSON file.
///
/// The whole state is held in memory and every write reseals the file.
pub struct EncryptedFileStore {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    params: KdfParams,
    policy: CyclePolicy,
    data: StoreData,
}

impl EncryptedFileStore {
    /// Default data file under the platform's local data directory.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let dir = dirs::data_local_dir()
            .ok_or(StoreError::NoDataDir)?
            .join("stage");
        Ok(dir.join("records.stage"))
    }

    /// Open the file at `path`, creating an empty sealed store if it does not exist.
    pub fn open(
        path: impl AsRef<Path>,
        passphrase: &str,
        params: KdfParams,
        policy: CyclePolicy,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let passphrase = Zeroizing::new(passphrase.to_owned());

        if path.exists() {
            let sealed = fs::read(&path)?;
            let plaintext = crypto::open(&passphrase, &sealed)?;
            let data: StoreData = serde_json::from_slice(&plaintext)?;
            tracing::debug!(path = %path.display(), cycles = data.cycles.len(), "opened data file");
            return Ok(Self {
                path,
                passphrase,
                params,
                policy,
                data,
            });
        }

        let store = Self {
            path,
            passphrase,
            params,
            policy,
            data: StoreData::default(),
        };
        store.persist()?;
        tracing::info!(path = %store.path.display(), "created data file");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = Zeroizing::new(serde_json::to_vec(&self.data)?);
        let sealed = crypto::seal(&self.passphrase, &json, &self.params)?;

        // Write next to the target and rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, sealed)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` and persist; on a failed write the in-memory state is rolled back.
    fn write<F>(&mut self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreData) -> Result<(), StoreError>,
    {
        let previous = self.data.clone();
        change(&mut self.data)?;
        if let Err(e) = self.persist() {
            self.data = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Remove the data file permanently.
    pub fn wipe(self) -> Result<(), StoreError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl RecordStore for EncryptedFileStore {
    fn list_cycles(&self) -> Result<Vec<CycleRecord>, StoreError> {
        Ok(sorted_desc(&self.data.cycles))
    }

    fn get_cycle(&self, id: Uuid) -> Result<CycleRecord, StoreError> {
        find(&self.data, id)
    }

    fn insert_cycle(&mut self, cycle: CycleRecord) -> Result<(), StoreError> {
        self.write(|data| {
            data.cycles.push(cycle);
            Ok(())
        })
    }

    fn update_cycle(&mut self, cycle: CycleRecord) -> Result<(), StoreError> {
        self.write(|data| apply_update(data, cycle))
    }

    fn delete_cycle(&mut self, id: Uuid) -> Result<(), StoreError> {
        self.write(|data| apply_delete(data, id))
    }

    fn get_settings(&mut self) -> Result<CycleSettings, StoreError> {
        if let Some(settings) = &self.data.settings {
            return Ok(settings.clone());
        }
        let settings = CycleSettings::with_policy(&self.policy);
        let created = settings.clone();
        self.write(|data| {
            data.settings = Some(created);
            Ok(())
        })?;
        Ok(settings)
    }

    fn upsert_settings(&mut self, settings: CycleSettings) -> Result<(), StoreError> {
        self.write(|data| {
            data.settings = Some(settings);
            Ok(())
        })
    }

    fn snapshot(&self) -> Result<StoreData, StoreError> {
        Ok(self.data.clone())
    }
}
