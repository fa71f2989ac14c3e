//! Study identity and metadata shared across the worker fleet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ConfigError;

/// Whether we are maximizing or minimizing an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl FromStr for Direction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maximize" => Ok(Self::Maximize),
            "minimize" => Ok(Self::Minimize),
            other => Err(ConfigError::InvalidDirection {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Maximize => write!(f, "maximize"),
            Self::Minimize => write!(f, "minimize"),
        }
    }
}

/// Storage identity of a study: the (name, storage location) pair. Must be
/// globally unique across the fleet sharing one storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyId {
    pub name: String,
    pub storage: String,
}

impl StudyId {
    pub fn new(name: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage: storage.into(),
        }
    }
}

impl std::fmt::Display for StudyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.name, self.storage)
    }
}

/// Optimization metadata persisted alongside a study's trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMeta {
    pub id: StudyId,

    /// One direction per objective; more than one means multi-objective.
    pub directions: Vec<Direction>,

    /// Sampler choice by name, so a resuming worker reattaches the same
    /// kind of sampler the study was created with.
    pub sampler: String,

    pub created_at: DateTime<Utc>,
}

impl StudyMeta {
    pub fn new(id: StudyId, directions: Vec<Direction>, sampler: impl Into<String>) -> Self {
        Self {
            id,
            directions,
            sampler: sampler.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_multi_objective(&self) -> bool {
        self.directions.len() > 1
    }
}
