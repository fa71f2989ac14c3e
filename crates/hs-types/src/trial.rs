//! Trial records and the usable/corrupt classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A concrete parameter value assigned to a trial by a sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Stored lifecycle state of a trial. Corruption is derived from the
/// intermediate values, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialState {
    Running,
    Complete,
    Failed,
}

/// One attempt to evaluate the objective at a sampled point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Monotonically increasing identifier within a study, assigned by the
    /// store on insertion (0-based).
    pub number: u64,

    /// Parameter point assigned by the sampler.
    pub parameters: HashMap<String, ParameterValue>,

    /// Per-step metric reports, keyed by step. A step is opened as `None`
    /// before its value lands, so a worker killed mid-step leaves a
    /// detectable hole.
    pub intermediate_values: BTreeMap<u64, Option<f64>>,

    /// Final objective value(s), one per study direction. Absent until the
    /// trial completes.
    pub values: Option<Vec<f64>>,

    pub state: TrialState,

    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(number: u64, parameters: HashMap<String, ParameterValue>) -> Self {
        Self {
            number,
            parameters,
            intermediate_values: BTreeMap::new(),
            values: None,
            state: TrialState::Running,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Open a reporting step. The step stays `None` until `report` fills it.
    pub fn open_step(&mut self, step: u64) {
        self.intermediate_values.entry(step).or_insert(None);
    }

    /// Record the metric value for a step.
    pub fn report(&mut self, step: u64, value: f64) {
        self.intermediate_values.insert(step, Some(value));
    }

    pub fn mark_completed(&mut self, values: Vec<f64>) {
        self.state = TrialState::Complete;
        self.values = Some(values);
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.state = TrialState::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// A trial is usable iff it has no intermediate values, or its
    /// most-advanced intermediate value is non-null. Anything else was
    /// killed mid-step and must never be replayed into a sampler's model.
    pub fn is_usable(&self) -> bool {
        match self.intermediate_values.iter().next_back() {
            None => true,
            Some((_, value)) => value.is_some(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        !self.is_usable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial_with_steps(steps: &[(u64, Option<f64>)]) -> Trial {
        let mut trial = Trial::new(0, HashMap::new());
        for (step, value) in steps {
            match value {
                Some(v) => trial.report(*step, *v),
                None => trial.open_step(*step),
            }
        }
        trial
    }

    #[test]
    fn empty_intermediates_is_usable() {
        let trial = trial_with_steps(&[]);
        assert!(trial.is_usable());
    }

    #[test]
    fn open_last_step_is_corrupt() {
        let trial = trial_with_steps(&[(0, Some(0.5)), (1, None)]);
        assert!(trial.is_corrupt());
    }

    #[test]
    fn filled_last_step_is_usable() {
        let trial = trial_with_steps(&[(0, Some(0.5)), (1, Some(0.7))]);
        assert!(trial.is_usable());
    }

    #[test]
    fn earlier_hole_does_not_corrupt() {
        // Only the most-advanced step decides.
        let trial = trial_with_steps(&[(0, None), (1, Some(0.7))]);
        assert!(trial.is_usable());
    }

    #[test]
    fn report_fills_an_open_step() {
        let mut trial = Trial::new(3, HashMap::new());
        trial.open_step(0);
        assert!(trial.is_corrupt());
        trial.report(0, 0.42);
        assert!(trial.is_usable());
        assert_eq!(trial.intermediate_values[&0], Some(0.42));
    }

    #[test]
    fn trial_lifecycle() {
        let mut params = HashMap::new();
        params.insert("lr".to_string(), ParameterValue::Float(0.01));

        let mut trial = Trial::new(7, params);
        assert_eq!(trial.state, TrialState::Running);
        assert!(trial.values.is_none());

        trial.mark_completed(vec![0.93]);
        assert_eq!(trial.state, TrialState::Complete);
        assert_eq!(trial.values.as_deref(), Some(&[0.93][..]));
        assert!(trial.finished_at.is_some());
    }

    #[test]
    fn failed_trial_keeps_no_values() {
        let mut trial = Trial::new(0, HashMap::new());
        trial.mark_failed();
        assert_eq!(trial.state, TrialState::Failed);
        assert!(trial.values.is_none());
    }

    #[test]
    fn parameter_value_serde_round_trip() {
        let mut params = HashMap::new();
        params.insert("lr".to_string(), ParameterValue::Float(0.01));
        params.insert("layers".to_string(), ParameterValue::Int(4));

        let trial = Trial::new(0, params);
        let json = serde_json::to_string(&trial).unwrap();
        let back: Trial = serde_json::from_str(&json).unwrap();
        assert_eq!(trial, back);
    }
}
