//! Search space definitions.

use hs_types::ParameterValue;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    Float { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    Int { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Float { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Int { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Draw one uniform point from the space.
    pub fn sample_uniform<R: Rng>(&self, rng: &mut R) -> HashMap<String, ParameterValue> {
        let mut point = HashMap::new();
        for param in &self.parameters {
            point.insert(param.name.clone(), sample_dimension(&param.kind, rng));
        }
        point
    }

    /// Total number of grid points (`None` if any parameter is continuous
    /// without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParameterKind::Int { low, high } => (high - low + 1) as usize,
                ParameterKind::Choice { values } => values.len(),
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn sample_dimension<R: Rng>(kind: &ParameterKind, rng: &mut R) -> ParameterValue {
    match kind {
        ParameterKind::Float { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
        ParameterKind::Int { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
        ParameterKind::LogUniform { low, high } => {
            let log_val: f64 = rng.random_range(low.ln()..=high.ln());
            ParameterValue::Float(log_val.exp())
        }
        ParameterKind::Choice { values } => {
            let idx = rng.random_range(0..values.len());
            ParameterValue::Json(values[idx].clone())
        }
    }
}
