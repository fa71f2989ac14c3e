//! Pluggable samplers: the "suggest next point, observe outcome" half of
//! the search backend.

use hs_types::{ConfigError, Direction, ParameterValue};
use rand::Rng;
use std::collections::HashMap;

use crate::space::{sample_dimension, ParameterKind, SearchSpace};

/// Common trait for all samplers.
///
/// A worker runs one trial at a time, so suggestion is one point at a time;
/// adaptive samplers learn from `observe` calls between suggestions.
pub trait Sampler: Send {
    /// Propose the next parameter point to evaluate.
    fn suggest(&mut self, space: &SearchSpace) -> HashMap<String, ParameterValue>;

    /// Report a completed trial so adaptive samplers can learn.
    fn observe(&mut self, _params: &HashMap<String, ParameterValue>, _values: &[f64]) {}

    /// Human-readable sampler name.
    fn name(&self) -> &'static str;
}

/// Resolve a sampler from its configured name. `None` falls back to the
/// TPE-style sampler, matching the default of the upstream optimizers this
/// worker fleet is pointed at.
pub fn sampler_by_name(
    name: Option<&str>,
    directions: &[Direction],
) -> Result<Box<dyn Sampler>, ConfigError> {
    match name.unwrap_or("tpe") {
        "tpe" => Ok(Box::new(TpeSampler::new(directions.to_vec()))),
        "random" => Ok(Box::new(RandomSampler::new())),
        "grid" => Ok(Box::new(GridSampler::new())),
        other => Err(ConfigError::UnknownSampler(other.to_string())),
    }
}

// ---- Random sampling ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Default)]
pub struct RandomSampler;

impl RandomSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for RandomSampler {
    fn suggest(&mut self, space: &SearchSpace) -> HashMap<String, ParameterValue> {
        space.sample_uniform(&mut rand::rng())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

// ---- Grid sampling ----

/// Exhaustive sweep over discrete parameter combinations, wrapping around
/// once the grid is exhausted (a fleet of workers keeps pulling points).
#[derive(Debug, Default)]
pub struct GridSampler {
    float_steps: usize,
    cursor: usize,
    combos: Vec<HashMap<String, ParameterValue>>,
}

impl GridSampler {
    pub fn new() -> Self {
        Self {
            float_steps: 5,
            cursor: 0,
            combos: Vec::new(),
        }
    }

    pub fn with_float_steps(mut self, steps: usize) -> Self {
        self.float_steps = steps;
        self
    }

    fn build_grid(&self, space: &SearchSpace) -> Vec<HashMap<String, ParameterValue>> {
        let mut axes: Vec<Vec<(&str, ParameterValue)>> = Vec::new();

        for param in &space.parameters {
            let values: Vec<ParameterValue> = match &param.kind {
                ParameterKind::Float { low, high } => {
                    let steps = self.float_steps.max(2);
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParameterValue::Float(low + t * (high - low))
                        })
                        .collect()
                }
                ParameterKind::Int { low, high } => (*low..=*high).map(ParameterValue::Int).collect(),
                ParameterKind::LogUniform { low, high } => {
                    let steps = self.float_steps.max(2);
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
                        })
                        .collect()
                }
                ParameterKind::Choice { values } => values
                    .iter()
                    .map(|v| ParameterValue::Json(v.clone()))
                    .collect(),
            };
            axes.push(
                values
                    .into_iter()
                    .map(|v| (param.name.as_str(), v))
                    .collect(),
            );
        }

        // Cartesian product
        let mut result: Vec<HashMap<String, ParameterValue>> = vec![HashMap::new()];
        for axis in &axes {
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for (name, value) in axis {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        result
    }
}

impl Sampler for GridSampler {
    fn suggest(&mut self, space: &SearchSpace) -> HashMap<String, ParameterValue> {
        if self.combos.is_empty() {
            self.combos = self.build_grid(space);
        }
        let point = self.combos[self.cursor % self.combos.len()].clone();
        self.cursor += 1;
        point
    }

    fn name(&self) -> &'static str {
        "grid"
    }
}

// ---- TPE-style adaptive sampling ----

/// Tree-structured-Parzen-flavored sampler: observed points are split into
/// a "good" and a "bad" set at a quantile of the first objective, and new
/// suggestions perturb a point drawn from the good set. Falls back to
/// uniform sampling until enough observations exist, and keeps a fixed
/// exploration probability thereafter.
///
/// For multi-objective studies the split ranks by the first objective; a
/// full multi-objective implementation can be substituted through the
/// `Sampler` trait.
pub struct TpeSampler {
    directions: Vec<Direction>,
    observations: Vec<(HashMap<String, ParameterValue>, Vec<f64>)>,
    gamma: f64,
    exploration: f64,
    startup_trials: usize,
}

impl TpeSampler {
    pub fn new(directions: Vec<Direction>) -> Self {
        Self {
            directions,
            observations: Vec::new(),
            gamma: 0.25,
            exploration: 0.1,
            startup_trials: 10,
        }
    }

    pub fn with_startup_trials(mut self, n: usize) -> Self {
        self.startup_trials = n;
        self
    }

    /// Observations sorted best-first by the first objective.
    fn ranked(&self) -> Vec<&(HashMap<String, ParameterValue>, Vec<f64>)> {
        let direction = self.directions.first().copied().unwrap_or(Direction::Minimize);
        let mut ranked: Vec<_> = self.observations.iter().collect();
        ranked.sort_by(|a, b| {
            let (x, y) = (a.1.first().copied(), b.1.first().copied());
            let ord = x
                .partial_cmp(&y)
                .unwrap_or(std::cmp::Ordering::Equal);
            match direction {
                Direction::Minimize => ord,
                Direction::Maximize => ord.reverse(),
            }
        });
        ranked
    }

    fn perturb<R: Rng>(
        &self,
        base: &HashMap<String, ParameterValue>,
        space: &SearchSpace,
        rng: &mut R,
    ) -> HashMap<String, ParameterValue> {
        let mut point = HashMap::new();
        for param in &space.parameters {
            let value = match (&param.kind, base.get(&param.name)) {
                (ParameterKind::Float { low, high }, Some(ParameterValue::Float(v))) => {
                    let noise = rng.random_range(-0.1..0.1) * (high - low);
                    ParameterValue::Float((v + noise).clamp(*low, *high))
                }
                (ParameterKind::Int { low, high }, Some(ParameterValue::Int(v))) => {
                    let delta: i64 = rng.random_range(-2..=2);
                    ParameterValue::Int((v + delta).clamp(*low, *high))
                }
                (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v))) => {
                    let log_range = high.ln() - low.ln();
                    let noise = rng.random_range(-0.1..0.1) * log_range;
                    ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                }
                // Choices and missing dimensions resample uniformly.
                (kind, _) => sample_dimension(kind, rng),
            };
            point.insert(param.name.clone(), value);
        }
        point
    }
}

impl Sampler for TpeSampler {
    fn suggest(&mut self, space: &SearchSpace) -> HashMap<String, ParameterValue> {
        let mut rng = rand::rng();
        if self.observations.is_empty()
            || self.observations.len() < self.startup_trials
            || rng.random::<f64>() < self.exploration
        {
            return space.sample_uniform(&mut rng);
        }

        let ranked = self.ranked();
        let good_len = ((ranked.len() as f64 * self.gamma).ceil() as usize).max(1);
        let pick = rng.random_range(0..good_len);
        let (base, _) = ranked[pick];
        let base = base.clone();
        self.perturb(&base, space, &mut rng)
    }

    fn observe(&mut self, params: &HashMap<String, ParameterValue>, values: &[f64]) {
        self.observations.push((params.clone(), values.to_vec()));
    }

    fn name(&self) -> &'static str {
        "tpe"
    }
}
