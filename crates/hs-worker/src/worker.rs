//! Worker-level orchestration: opening (and repairing) the study, then
//! running the budget-governed sweep.

use hs_study::{repair_study, Study, StudyStore};
use hs_types::{ConfigError, HsResult, StudyMeta};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::bench;
use crate::config::{ModelConfig, SweepConfig};
use crate::runner::{RunReport, RunnerConfig, TrialRunner};

/// Whether this worker creates the study or attaches to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyMode {
    Fresh,
    Resume,
}

/// Open the study for this worker.
///
/// Fresh mode creates it and fails if the identity is already taken.
/// Resume mode loads it, fails if it is missing, and then repairs it;
/// repair assumes no other worker is attached yet, so resuming workers
/// must be started staggered or after the fleet's bootstrap created the
/// study. Returns the study metadata and any removed trial numbers.
pub fn open_study(
    store: &dyn StudyStore,
    meta: StudyMeta,
    mode: StudyMode,
) -> HsResult<(StudyMeta, Vec<u64>)> {
    match mode {
        StudyMode::Fresh => {
            let meta = store.create_study(meta)?;
            info!("Created study {}", meta.id);
            Ok((meta, Vec::new()))
        }
        StudyMode::Resume => {
            let loaded = store.load_study(&meta.id)?;
            if loaded.directions != meta.directions {
                warn!(
                    "Study {} was created with directions {:?}; configured {:?} are ignored",
                    loaded.id, loaded.directions, meta.directions
                );
            }
            info!(
                "Checking study {} for broken trials (those killed before finishing one step)",
                loaded.id
            );
            let (repaired, removed) = repair_study(store, &loaded)?;
            Ok((repaired, removed))
        }
    }
}

/// Run one worker's whole sweep: open or resume the study, attach the
/// sampler, resolve the objective, and drive the trial loop until one of
/// its terminal states.
pub fn run_sweep(
    config: &SweepConfig,
    model_config: &ModelConfig,
    store: Arc<dyn StudyStore>,
    interrupt: Arc<AtomicBool>,
) -> HsResult<RunReport> {
    let wall_budget = config.wall_time()?;
    let mode = if config.study.resume {
        StudyMode::Resume
    } else {
        StudyMode::Fresh
    };

    let (meta, removed) = open_study(store.as_ref(), config.study_meta()?, mode)?;
    if !removed.is_empty() {
        warn!("Repair removed trials {removed:?} before this worker started");
    }

    let sampler = hs_search::sampler_by_name(Some(meta.sampler.as_str()), &meta.directions)?;
    let n_directions = meta.directions.len();
    let study = Study::attach(store, meta, config.search_space(), sampler)?;

    let objective_name = config
        .study
        .objective
        .as_deref()
        .ok_or_else(|| ConfigError::MissingField("study.objective".to_string()))?;
    let objective = bench::objective_by_name(
        objective_name,
        model_config,
        &config.metrics(),
        config.device(),
        n_directions,
    )?;

    let runner_config = RunnerConfig {
        target_trials: config.study.n_trials,
        wall_budget,
    };
    let mut runner = TrialRunner::new(study, objective, runner_config, interrupt);
    Ok(runner.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::StopReason;
    use hs_study::MemoryStore;
    use hs_types::{HsError, StorageError, Trial, TrialState};
    use std::collections::HashMap;

    fn sweep_config(resume: bool) -> SweepConfig {
        let yaml = format!(
            r#"
study:
  name: smoke
  storage: mem://test
  direction: minimize
  metric: loss
  n_trials: 3
  resume: {resume}
  sampler: random
  wall_time: "01:00:00"
  objective: sphere
parameters:
  x: {{type: float, low: 0.0, high: 1.0}}
"#
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn model_config() -> ModelConfig {
        serde_json::json!({"train": {"epochs": 2}})
    }

    #[test]
    fn fresh_sweep_runs_to_target() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let config = sweep_config(false);
        let interrupt = Arc::new(AtomicBool::new(false));

        let report = run_sweep(
            &config,
            &model_config(),
            store.clone(),
            interrupt,
        )
        .unwrap();
        assert!(matches!(report.reason, StopReason::TargetReached));
        assert_eq!(report.trials_run, 3);

        let trials = store.list_trials(&config.study_id()).unwrap();
        assert_eq!(trials.len(), 3);
        assert!(trials.iter().all(|t| t.state == TrialState::Complete));
        assert!(trials.iter().all(|t| t.values.is_some()));
    }

    #[test]
    fn fresh_on_existing_study_fails() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let config = sweep_config(false);
        store.create_study(config.study_meta().unwrap()).unwrap();

        let err = run_sweep(
            &config,
            &model_config(),
            store,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HsError::Storage(StorageError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn resume_on_missing_study_fails() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let config = sweep_config(true);

        let err = run_sweep(
            &config,
            &model_config(),
            store,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HsError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn resume_repairs_broken_trials_then_runs() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let config = sweep_config(true);
        let meta = store.create_study(config.study_meta().unwrap()).unwrap();

        // A trial some earlier worker was killed in the middle of.
        let mut broken = store
            .append_trial(&meta.id, Trial::new(0, HashMap::new()))
            .unwrap();
        broken.open_step(0);
        store.update_trial(&meta.id, &broken).unwrap();

        let report = run_sweep(
            &config,
            &model_config(),
            store.clone(),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        assert!(matches!(report.reason, StopReason::TargetReached));

        // The broken trial is gone; only this worker's trials remain.
        let trials = store.list_trials(&meta.id).unwrap();
        assert_eq!(trials.len(), 3);
        assert!(trials.iter().all(|t| t.is_usable()));
    }
}
