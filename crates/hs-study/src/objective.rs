//! The user-objective contract and the trial handle it runs against.

use hs_types::{HsResult, ObjectiveError, ParameterValue, StudyId, Trial};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::store::StudyStore;

/// A user-supplied objective function.
///
/// Evaluated once per trial against the handle's sampled parameters;
/// returns one value per study direction. Intermediate values may be
/// reported through the handle during execution. Cancellation is
/// cooperative: well-behaved objectives poll `interrupted()` and
/// `deadline_expired()` between steps, but nothing here can preempt one
/// that does not.
pub trait Objective: Send {
    fn evaluate(&self, trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError>;
}

/// Handle to the in-flight trial, passed to the objective.
///
/// Step reports write through to the study store immediately, so a worker
/// killed mid-trial leaves its partial history visible to repair.
pub struct TrialContext<'a> {
    store: &'a dyn StudyStore,
    study_id: StudyId,
    trial: Trial,
    deadline: Option<Instant>,
    interrupt: Arc<AtomicBool>,
}

impl<'a> TrialContext<'a> {
    pub(crate) fn new(
        store: &'a dyn StudyStore,
        study_id: StudyId,
        trial: Trial,
        deadline: Option<Instant>,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            study_id,
            trial,
            deadline,
            interrupt,
        }
    }

    pub fn number(&self) -> u64 {
        self.trial.number
    }

    pub fn params(&self) -> &HashMap<String, ParameterValue> {
        &self.trial.parameters
    }

    pub fn param(&self, name: &str) -> Option<&ParameterValue> {
        self.trial.parameters.get(name)
    }

    /// Open a reporting step: persisted as null until `report` fills it.
    /// Call at the start of each epoch so a mid-step kill is detectable.
    pub fn start_step(&mut self, step: u64) -> HsResult<()> {
        self.trial.open_step(step);
        self.store.update_trial(&self.study_id, &self.trial)
    }

    /// Record the metric value for a step.
    pub fn report(&mut self, step: u64, value: f64) -> HsResult<()> {
        self.trial.report(step, value);
        self.store.update_trial(&self.study_id, &self.trial)
    }

    /// True once the operator has asked the worker to stop.
    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Shorthand for objectives that stop between steps.
    pub fn check_interrupted(&self) -> Result<(), ObjectiveError> {
        if self.interrupted() {
            Err(ObjectiveError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// True once the per-trial deadline has passed.
    pub fn deadline_expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    pub(crate) fn into_trial(self) -> Trial {
        self.trial
    }
}
