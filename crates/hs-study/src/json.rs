//! JSON-file-backed study store.
//!
//! One file per study under a root directory, rewritten whole on every
//! mutation via a temp-file-then-rename so a killed worker never leaves a
//! half-written study behind. Suitable for a fleet whose storage location
//! is a shared filesystem; cross-process write races are the caller's
//! problem, exactly as with the other store implementations.

use hs_types::{HsError, HsResult, StorageError, StudyId, StudyMeta, Trial};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::{StudyRecord, StudyStore};

/// File-backed store rooted at a directory; the study's `storage` string is
/// expected to be that directory.
#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(root: P) -> HsResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn study_path(&self, id: &StudyId) -> PathBuf {
        self.root.join(format!("{}.json", id.name))
    }

    fn read_record(&self, id: &StudyId) -> HsResult<StudyRecord> {
        let path = self.study_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound {
                study: id.name.clone(),
                storage: id.storage.clone(),
            }
            .into());
        }
        let bytes = fs::read(&path)?;
        let record: StudyRecord = serde_json::from_slice(&bytes)?;
        Ok(record)
    }

    fn write_record(&self, id: &StudyId, record: &StudyRecord) -> HsResult<()> {
        let path = self.study_path(id);
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl StudyStore for JsonStore {
    fn create_study(&self, meta: StudyMeta) -> HsResult<StudyMeta> {
        let path = self.study_path(&meta.id);
        if path.exists() {
            return Err(StorageError::AlreadyExists {
                study: meta.id.name.clone(),
                storage: meta.id.storage.clone(),
            }
            .into());
        }
        self.write_record(&meta.id, &StudyRecord::new(meta.clone()))?;
        Ok(meta)
    }

    fn load_study(&self, id: &StudyId) -> HsResult<StudyMeta> {
        Ok(self.read_record(id)?.meta)
    }

    fn delete_study(&self, id: &StudyId) -> HsResult<()> {
        let path = self.study_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound {
                study: id.name.clone(),
                storage: id.storage.clone(),
            }
            .into());
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn append_trial(&self, id: &StudyId, mut trial: Trial) -> HsResult<Trial> {
        let mut record = self.read_record(id)?;
        trial.number = record.trials.len() as u64;
        record.trials.push(trial.clone());
        self.write_record(id, &record)?;
        Ok(trial)
    }

    fn update_trial(&self, id: &StudyId, trial: &Trial) -> HsResult<()> {
        let mut record = self.read_record(id)?;
        let slot = record
            .trials
            .iter_mut()
            .find(|t| t.number == trial.number)
            .ok_or(StorageError::TrialNotFound {
                study: id.name.clone(),
                number: trial.number,
            })
            .map_err(HsError::from)?;
        *slot = trial.clone();
        self.write_record(id, &record)
    }

    fn list_trials(&self, id: &StudyId) -> HsResult<Vec<Trial>> {
        Ok(self.read_record(id)?.trials)
    }
}
