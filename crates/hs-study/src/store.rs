//! The study-store capability trait and the in-memory implementation.

use hs_types::{HsResult, StorageError, StudyId, StudyMeta, Trial};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capability interface over a shared study backend.
///
/// The backend is assumed to make each individual operation atomic; nothing
/// here spans operations transactionally. Any conforming implementation
/// (in-memory, file-backed, networked) can be substituted.
pub trait StudyStore: Send + Sync {
    /// Create a study. Fails with [`StorageError::AlreadyExists`] if the
    /// identity is taken.
    fn create_study(&self, meta: StudyMeta) -> HsResult<StudyMeta>;

    /// Load an existing study's metadata. Fails with
    /// [`StorageError::NotFound`] if it does not exist.
    fn load_study(&self, id: &StudyId) -> HsResult<StudyMeta>;

    /// Delete a study and all of its trials.
    fn delete_study(&self, id: &StudyId) -> HsResult<()>;

    /// Append a trial to a study. The store assigns the next sequential
    /// trial number and returns the stored trial.
    fn append_trial(&self, id: &StudyId, trial: Trial) -> HsResult<Trial>;

    /// Replace the stored trial with the same number.
    fn update_trial(&self, id: &StudyId, trial: &Trial) -> HsResult<()>;

    /// All trials of a study, in insertion order.
    fn list_trials(&self, id: &StudyId) -> HsResult<Vec<Trial>>;
}

/// A study's full persisted state: metadata plus trial history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyRecord {
    pub meta: StudyMeta,
    pub trials: Vec<Trial>,
}

impl StudyRecord {
    pub fn new(meta: StudyMeta) -> Self {
        Self {
            meta,
            trials: Vec::new(),
        }
    }
}

fn not_found(id: &StudyId) -> StorageError {
    StorageError::NotFound {
        study: id.name.clone(),
        storage: id.storage.clone(),
    }
}

/// In-memory store, for tests and single-process runs.
#[derive(Default)]
pub struct MemoryStore {
    studies: RwLock<HashMap<StudyId, StudyRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StudyStore for MemoryStore {
    fn create_study(&self, meta: StudyMeta) -> HsResult<StudyMeta> {
        let mut studies = self.studies.write();
        if studies.contains_key(&meta.id) {
            return Err(StorageError::AlreadyExists {
                study: meta.id.name.clone(),
                storage: meta.id.storage.clone(),
            }
            .into());
        }
        studies.insert(meta.id.clone(), StudyRecord::new(meta.clone()));
        Ok(meta)
    }

    fn load_study(&self, id: &StudyId) -> HsResult<StudyMeta> {
        let studies = self.studies.read();
        studies
            .get(id)
            .map(|record| record.meta.clone())
            .ok_or_else(|| not_found(id).into())
    }

    fn delete_study(&self, id: &StudyId) -> HsResult<()> {
        let mut studies = self.studies.write();
        studies
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id).into())
    }

    fn append_trial(&self, id: &StudyId, mut trial: Trial) -> HsResult<Trial> {
        let mut studies = self.studies.write();
        let record = studies.get_mut(id).ok_or_else(|| not_found(id))?;
        trial.number = record.trials.len() as u64;
        record.trials.push(trial.clone());
        Ok(trial)
    }

    fn update_trial(&self, id: &StudyId, trial: &Trial) -> HsResult<()> {
        let mut studies = self.studies.write();
        let record = studies.get_mut(id).ok_or_else(|| not_found(id))?;
        let slot = record
            .trials
            .iter_mut()
            .find(|t| t.number == trial.number)
            .ok_or_else(|| StorageError::TrialNotFound {
                study: id.name.clone(),
                number: trial.number,
            })?;
        *slot = trial.clone();
        Ok(())
    }

    fn list_trials(&self, id: &StudyId) -> HsResult<Vec<Trial>> {
        let studies = self.studies.read();
        studies
            .get(id)
            .map(|record| record.trials.clone())
            .ok_or_else(|| not_found(id).into())
    }
}
