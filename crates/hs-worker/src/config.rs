//! Two-document YAML configuration for the worker process: a sweep config
//! describing the study and its search space, and an opaque model config
//! handed through to the objective.

use hs_search::{ParameterDef, ParameterKind, SearchSpace};
use hs_types::{ConfigError, Direction, HsResult, StudyId, StudyMeta};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// One value or a homogeneous list, for fields that admit both single- and
/// multi-objective form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

/// The sweep document: study identity, optimization settings, search
/// space, and logging.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    pub study: StudyBlock,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterKind>,
    #[serde(default)]
    pub log: Option<LogBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudyBlock {
    pub name: String,
    /// Storage location shared by the fleet; with the file-backed store
    /// this is a directory path.
    pub storage: String,
    pub direction: OneOrMany<String>,
    pub metric: OneOrMany<String>,
    pub n_trials: u64,
    #[serde(default)]
    pub resume: bool,
    #[serde(default)]
    pub sampler: Option<String>,
    /// Wall-clock allowance as `HH:MM:SS`, matching the batch scheduler's
    /// time-limit format.
    pub wall_time: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub gpu: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogBlock {
    #[serde(default = "default_log_path")]
    pub save_path: String,
}

fn default_log_path() -> String {
    "log.txt".to_string()
}

/// The model/task document. Opaque to the core; handed through to the
/// objective as-is.
pub type ModelConfig = serde_json::Value;

impl SweepConfig {
    pub fn directions(&self) -> Result<Vec<Direction>, ConfigError> {
        self.study
            .direction
            .to_vec()
            .iter()
            .map(|s| s.parse())
            .collect()
    }

    pub fn metrics(&self) -> Vec<String> {
        self.study.metric.to_vec()
    }

    pub fn wall_time(&self) -> Result<Duration, ConfigError> {
        let raw = self
            .study
            .wall_time
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("study.wall_time".to_string()))?;
        parse_wall_time(raw)
    }

    pub fn study_id(&self) -> StudyId {
        StudyId::new(&self.study.name, &self.study.storage)
    }

    pub fn study_meta(&self) -> Result<StudyMeta, ConfigError> {
        Ok(StudyMeta::new(
            self.study_id(),
            self.directions()?,
            self.study.sampler.clone().unwrap_or_else(|| "tpe".to_string()),
        ))
    }

    pub fn search_space(&self) -> SearchSpace {
        let mut space = SearchSpace::new();
        for (name, kind) in &self.parameters {
            space.parameters.push(ParameterDef {
                name: name.clone(),
                kind: kind.clone(),
            });
        }
        space
    }

    pub fn device(&self) -> &'static str {
        if self.study.gpu {
            "cuda:0"
        } else {
            "cpu"
        }
    }
}

/// Parse a scheduler-style `HH:MM:SS` wall time into seconds.
pub fn parse_wall_time(value: &str) -> Result<Duration, ConfigError> {
    fn num(value: &str, part: &str) -> Result<u64, ConfigError> {
        part.parse().map_err(|_| ConfigError::InvalidWallTime {
            value: value.to_string(),
        })
    }

    let parts: Vec<&str> = value.split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return Err(ConfigError::InvalidWallTime {
            value: value.to_string(),
        });
    };
    Ok(Duration::from_secs(
        num(value, h)? * 3600 + num(value, m)? * 60 + num(value, s)?,
    ))
}

fn load_yaml_value(path: &Path) -> HsResult<serde_json::Value> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let raw = fs::read_to_string(path)?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    let json = serde_json::to_value(yaml).map_err(|e| ConfigError::Malformed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(json)
}

/// Load the sweep document: typed config plus the raw value for the
/// flattened startup report.
pub fn load_sweep_config(path: &Path) -> HsResult<(SweepConfig, serde_json::Value)> {
    let value = load_yaml_value(path)?;
    let config = serde_json::from_value(value.clone()).map_err(|e| ConfigError::Malformed {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok((config, value))
}

/// Load the model document, kept opaque.
pub fn load_model_config(path: &Path) -> HsResult<ModelConfig> {
    load_yaml_value(path)
}

/// Command-line overrides applied on top of the sweep config. Each
/// replacement is logged as `old -> new`.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub study_name: Option<String>,
    pub storage: Option<String>,
    pub direction: Option<String>,
    pub metric: Option<String>,
    pub n_trials: Option<u64>,
    pub sampler: Option<String>,
    pub objective: Option<String>,
    pub resume: Option<bool>,
}

pub fn apply_overrides(config: &mut SweepConfig, overrides: &Overrides) {
    if let Some(name) = &overrides.study_name {
        info!("Overriding study.name: {} -> {}", config.study.name, name);
        config.study.name = name.clone();
    }
    if let Some(storage) = &overrides.storage {
        info!(
            "Overriding study.storage: {} -> {}",
            config.study.storage, storage
        );
        config.study.storage = storage.clone();
    }
    if let Some(direction) = &overrides.direction {
        info!(
            "Overriding study.direction: {:?} -> {}",
            config.study.direction.to_vec(),
            direction
        );
        config.study.direction = OneOrMany::One(direction.clone());
    }
    if let Some(metric) = &overrides.metric {
        info!(
            "Overriding study.metric: {:?} -> {}",
            config.study.metric.to_vec(),
            metric
        );
        config.study.metric = OneOrMany::One(metric.clone());
    }
    if let Some(n_trials) = overrides.n_trials {
        info!(
            "Overriding study.n_trials: {} -> {}",
            config.study.n_trials, n_trials
        );
        config.study.n_trials = n_trials;
    }
    if let Some(sampler) = &overrides.sampler {
        info!(
            "Overriding study.sampler: {:?} -> {}",
            config.study.sampler, sampler
        );
        config.study.sampler = Some(sampler.clone());
    }
    if let Some(objective) = &overrides.objective {
        info!(
            "Overriding study.objective: {:?} -> {}",
            config.study.objective, objective
        );
        config.study.objective = Some(objective.clone());
    }
    if let Some(resume) = overrides.resume {
        info!(
            "Overriding study.resume: {} -> {}",
            config.study.resume, resume
        );
        config.study.resume = resume;
    }
}

/// Flatten a config document into dotted-path leaves for the startup log.
pub fn configuration_report(value: &serde_json::Value) -> Vec<(String, String)> {
    fn flatten(value: &serde_json::Value, path: String, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    flatten(child, child_path, out);
                }
            }
            serde_json::Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    flatten(child, format!("{path}.{index}"), out);
                }
            }
            serde_json::Value::String(s) => out.push((path, s.clone())),
            leaf => out.push((path, leaf.to_string())),
        }
    }

    let mut entries = Vec::new();
    flatten(value, String::new(), &mut entries);
    entries
}
