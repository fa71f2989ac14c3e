//! Built-in benchmark objectives.
//!
//! Real deployments supply their own [`Objective`] implementation through
//! the library API; these synthetic surfaces exist so a fleet, its storage,
//! and its budget handling can be smoke-tested end to end from the CLI.

use hs_study::{Objective, TrialContext};
use hs_types::{ConfigError, ObjectiveError};
use tracing::debug;

/// Resolve a built-in objective from the configured name.
pub fn objective_by_name(
    name: &str,
    model_config: &serde_json::Value,
    metrics: &[String],
    device: &str,
    n_directions: usize,
) -> Result<Box<dyn Objective>, ConfigError> {
    let epochs = model_config
        .pointer("/train/epochs")
        .and_then(|v| v.as_u64())
        .unwrap_or(5);
    debug!("Objective {name} on {device} reporting {metrics:?} over {epochs} epochs");
    match name {
        "sphere" => Ok(Box::new(SphereObjective {
            epochs,
            n_directions,
        })),
        "rastrigin" => Ok(Box::new(RastriginObjective { epochs })),
        other => Err(ConfigError::UnknownObjective(other.to_string())),
    }
}

fn step_wise<F>(trial: &mut TrialContext<'_>, epochs: u64, per_step: F) -> Result<(), ObjectiveError>
where
    F: Fn(u64) -> f64,
{
    for epoch in 0..epochs {
        trial.check_interrupted()?;
        trial.start_step(epoch).map_err(fatal)?;
        trial.report(epoch, per_step(epoch)).map_err(fatal)?;
        if trial.deadline_expired() {
            // Cooperative timeout: stop reporting steps rather than run
            // into the scheduler's kill.
            break;
        }
    }
    Ok(())
}

fn fatal(err: hs_types::HsError) -> ObjectiveError {
    ObjectiveError::Fatal(err.to_string())
}

/// Shifted sphere surface: the sum of squared distances of every numeric
/// parameter from a per-objective center, "converging" toward it across
/// epochs so intermediate reports look like a training curve.
struct SphereObjective {
    epochs: u64,
    n_directions: usize,
}

impl SphereObjective {
    fn value_for(&self, trial: &TrialContext<'_>, objective_index: usize) -> f64 {
        let center = (objective_index as f64 + 1.0) / (self.n_directions as f64 + 1.0);
        trial
            .params()
            .values()
            .filter_map(|v| v.as_f64())
            .map(|v| (v - center).powi(2))
            .sum()
    }
}

impl Objective for SphereObjective {
    fn evaluate(&self, trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
        let target = self.value_for(trial, 0);
        let epochs = self.epochs;
        // Approach the target value across epochs so the intermediate
        // reports look like a training curve.
        step_wise(trial, epochs, |epoch| {
            target * (1.0 + 1.0 / (epoch as f64 + 1.0))
        })?;
        Ok((0..self.n_directions)
            .map(|i| self.value_for(trial, i))
            .collect())
    }
}

/// Rastrigin surface over the numeric parameters; single-objective.
struct RastriginObjective {
    epochs: u64,
}

impl Objective for RastriginObjective {
    fn evaluate(&self, trial: &mut TrialContext<'_>) -> Result<Vec<f64>, ObjectiveError> {
        let xs: Vec<f64> = trial.params().values().filter_map(|v| v.as_f64()).collect();
        let value = 10.0 * xs.len() as f64
            + xs.iter()
                .map(|x| x * x - 10.0 * (2.0 * std::f64::consts::PI * x).cos())
                .sum::<f64>();
        let epochs = self.epochs;
        step_wise(trial, epochs, |epoch| {
            value * (1.0 + 1.0 / (epoch as f64 + 1.0))
        })?;
        Ok(vec![value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_objective_is_rejected() {
        let err = objective_by_name(
            "mystery",
            &serde_json::json!({}),
            &["loss".to_string()],
            "cpu",
            1,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::UnknownObjective(_)));
    }

    #[test]
    fn known_objectives_resolve() {
        for name in ["sphere", "rastrigin"] {
            assert!(objective_by_name(
                name,
                &serde_json::json!({"train": {"epochs": 3}}),
                &["loss".to_string()],
                "cpu",
                1,
            )
            .is_ok());
        }
    }
}
