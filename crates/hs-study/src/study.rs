//! The study handle: one-trial-at-a-time execution against a store.

use hs_search::{Sampler, SearchSpace};
use hs_types::{HsResult, ObjectiveError, StudyId, StudyMeta, Trial};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::objective::{Objective, TrialContext};
use crate::store::StudyStore;

/// What a recorded trial attempt came back with. Backend-reported failures
/// are recorded like completions; they do not halt the run.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Completed { number: u64, values: Vec<f64> },
    Failed { number: u64, message: String },
}

impl TrialOutcome {
    pub fn number(&self) -> u64 {
        match self {
            Self::Completed { number, .. } | Self::Failed { number, .. } => *number,
        }
    }
}

/// A worker's attachment to one study: store access, metadata, the search
/// space, and the sampler proposing points.
pub struct Study {
    store: Arc<dyn StudyStore>,
    meta: StudyMeta,
    space: SearchSpace,
    sampler: Box<dyn Sampler>,
}

impl Study {
    /// Create a fresh study. Fails if the identity already exists.
    pub fn create(
        store: Arc<dyn StudyStore>,
        meta: StudyMeta,
        space: SearchSpace,
        sampler: Box<dyn Sampler>,
    ) -> HsResult<Self> {
        let meta = store.create_study(meta)?;
        info!("Created study {}", meta.id);
        Ok(Self {
            store,
            meta,
            space,
            sampler,
        })
    }

    /// Attach to an already-loaded (and, on resume, already-repaired)
    /// study. Completed trials are replayed into the sampler so an
    /// adaptive sampler resumes with the fleet's history.
    pub fn attach(
        store: Arc<dyn StudyStore>,
        meta: StudyMeta,
        space: SearchSpace,
        mut sampler: Box<dyn Sampler>,
    ) -> HsResult<Self> {
        let trials = store.list_trials(&meta.id)?;
        let mut replayed = 0usize;
        for trial in &trials {
            if let Some(values) = &trial.values {
                sampler.observe(&trial.parameters, values);
                replayed += 1;
            }
        }
        info!(
            "Loaded study {} with {} trials ({} replayed into the sampler)",
            meta.id,
            trials.len(),
            replayed
        );
        Ok(Self {
            store,
            meta,
            space,
            sampler,
        })
    }

    pub fn meta(&self) -> &StudyMeta {
        &self.meta
    }

    pub fn id(&self) -> &StudyId {
        &self.meta.id
    }

    pub fn trials(&self) -> HsResult<Vec<Trial>> {
        self.store.list_trials(&self.meta.id)
    }

    /// Run exactly one trial: sample a point, persist the running trial,
    /// evaluate the objective under a cooperative deadline, and record the
    /// outcome.
    ///
    /// An `Err` of [`ObjectiveError::Interrupted`] is the operator's stop
    /// request; any other `Err` is fatal to the caller's run. Both leave
    /// the in-flight trial as-is in the store, which is exactly what the
    /// repair pass looks for on the next resume.
    pub fn run_one(
        &mut self,
        objective: &dyn Objective,
        deadline: Option<Instant>,
        interrupt: &Arc<AtomicBool>,
    ) -> HsResult<TrialOutcome> {
        let params = self.sampler.suggest(&self.space);
        let trial = self
            .store
            .append_trial(&self.meta.id, Trial::new(0, params))?;
        let number = trial.number;
        debug!("Trial {number} sampled by {}", self.sampler.name());

        let mut ctx = TrialContext::new(
            self.store.as_ref(),
            self.meta.id.clone(),
            trial,
            deadline,
            interrupt.clone(),
        );

        match objective.evaluate(&mut ctx) {
            Ok(values) => {
                if values.len() != self.meta.directions.len() {
                    return Err(ObjectiveError::ValueArity {
                        expected: self.meta.directions.len(),
                        got: values.len(),
                    }
                    .into());
                }
                let mut trial = ctx.into_trial();
                trial.mark_completed(values.clone());
                self.store.update_trial(&self.meta.id, &trial)?;
                self.sampler.observe(&trial.parameters, &values);
                Ok(TrialOutcome::Completed { number, values })
            }
            Err(ObjectiveError::TrialFailed(message)) => {
                let mut trial = ctx.into_trial();
                trial.mark_failed();
                self.store.update_trial(&self.meta.id, &trial)?;
                Ok(TrialOutcome::Failed { number, message })
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use hs_search::RandomSampler;
    use hs_types::{Direction, HsError, TrialState};

    struct ConstObjective(f64);

    impl Objective for ConstObjective {
        fn evaluate(&self, trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
            trial.start_step(0).map_err(to_fatal)?;
            trial.report(0, self.0).map_err(to_fatal)?;
            Ok(vec![self.0])
        }
    }

    struct FailingObjective;

    impl Objective for FailingObjective {
        fn evaluate(&self, _trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
            Err(ObjectiveError::TrialFailed("diverged".to_string()))
        }
    }

    struct InterruptingObjective;

    impl Objective for InterruptingObjective {
        fn evaluate(&self, trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
            trial.start_step(0).map_err(to_fatal)?;
            Err(ObjectiveError::Interrupted)
        }
    }

    fn to_fatal(err: HsError) -> ObjectiveError {
        ObjectiveError::Fatal(err.to_string())
    }

    fn study(store: Arc<dyn StudyStore>) -> Study {
        let meta = StudyMeta::new(
            StudyId::new("s", "mem://test"),
            vec![Direction::Minimize],
            "random",
        );
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        Study::create(store, meta, space, Box::new(RandomSampler::new())).unwrap()
    }

    #[test]
    fn run_one_records_a_completed_trial() {
        let store = Arc::new(MemoryStore::new());
        let mut study = study(store.clone());
        let interrupt = Arc::new(AtomicBool::new(false));

        let outcome = study
            .run_one(&ConstObjective(0.25), None, &interrupt)
            .unwrap();
        assert_eq!(
            outcome,
            TrialOutcome::Completed {
                number: 0,
                values: vec![0.25]
            }
        );

        let trials = study.trials().unwrap();
        assert_eq!(trials[0].state, TrialState::Complete);
        assert_eq!(trials[0].intermediate_values[&0], Some(0.25));
        assert!(trials[0].parameters.contains_key("x"));
    }

    #[test]
    fn backend_reported_failure_is_recorded_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let mut study = study(store.clone());
        let interrupt = Arc::new(AtomicBool::new(false));

        let outcome = study.run_one(&FailingObjective, None, &interrupt).unwrap();
        assert!(matches!(outcome, TrialOutcome::Failed { number: 0, .. }));
        assert_eq!(study.trials().unwrap()[0].state, TrialState::Failed);
    }

    #[test]
    fn interrupt_propagates_and_leaves_trial_in_flight() {
        let store = Arc::new(MemoryStore::new());
        let mut study = study(store.clone());
        let interrupt = Arc::new(AtomicBool::new(false));

        let err = study
            .run_one(&InterruptingObjective, None, &interrupt)
            .unwrap_err();
        assert!(matches!(
            err,
            HsError::Objective(ObjectiveError::Interrupted)
        ));

        // The abandoned trial is still Running with an open step, which is
        // what the repair pass excises on the next resume.
        let trials = study.trials().unwrap();
        assert_eq!(trials[0].state, TrialState::Running);
        assert!(trials[0].is_corrupt());
    }

    #[test]
    fn wrong_value_arity_is_fatal() {
        struct TwoValues;
        impl Objective for TwoValues {
            fn evaluate(&self, _: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
                Ok(vec![1.0, 2.0])
            }
        }

        let store = Arc::new(MemoryStore::new());
        let mut study = study(store);
        let interrupt = Arc::new(AtomicBool::new(false));
        let err = study.run_one(&TwoValues, None, &interrupt).unwrap_err();
        assert!(matches!(
            err,
            HsError::Objective(ObjectiveError::ValueArity {
                expected: 1,
                got: 2
            })
        ));
    }
}
