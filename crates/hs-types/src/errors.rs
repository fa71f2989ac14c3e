use thiserror::Error;

/// Main error type for the Hypersweep system
#[derive(Error, Debug)]
pub enum HsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Objective error: {0}")]
    Objective(#[from] ObjectiveError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors. All of these are fatal at startup;
/// nothing runs once one is raised.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {path} does not exist")]
    FileNotFound { path: String },

    #[error("Malformed config {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Optimizer direction {value} not recognized. Choose from maximize or minimize")]
    InvalidDirection { value: String },

    #[error("Invalid wall time {value}: expected HH:MM:SS")]
    InvalidWallTime { value: String },

    #[error("Unknown sampler: {0}")]
    UnknownSampler(String),

    #[error("Unknown objective: {0}")]
    UnknownObjective(String),
}

/// Study-store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Study {study} already exists at {storage}. Delete it or resume instead")]
    AlreadyExists { study: String, storage: String },

    #[error("Study {study} does not exist at {storage}. Create it first")]
    NotFound { study: String, storage: String },

    #[error("Trial {number} not found in study {study}")]
    TrialNotFound { study: String, number: u64 },

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Errors raised while executing a single trial.
#[derive(Error, Debug)]
pub enum ObjectiveError {
    /// The objective reported that this trial failed. The trial is recorded
    /// as failed and the run continues.
    #[error("Trial failed: {0}")]
    TrialFailed(String),

    /// An unexpected failure. The run halts rather than retrying, since
    /// the failure's recurrence probability is unknown.
    #[error("Objective raised: {0}")]
    Fatal(String),

    /// The objective returned the wrong number of values for the study's
    /// direction list. Halts the run.
    #[error("Objective returned {got} values, study expects {expected}")]
    ValueArity { expected: usize, got: usize },

    /// Operator interrupt observed mid-trial. A controlled stop, not an
    /// error; never retried.
    #[error("Interrupted")]
    Interrupted,
}

/// Result type alias for Hypersweep operations
pub type HsResult<T> = Result<T, HsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::AlreadyExists {
            study: "lr-sweep".to_string(),
            storage: "/tmp/studies".to_string(),
        };
        assert!(err.to_string().contains("lr-sweep"));
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn error_conversion() {
        let storage_err = StorageError::Backend("disk full".to_string());
        let hs_err: HsError = storage_err.into();
        match hs_err {
            HsError::Storage(_) => (),
            _ => panic!("Expected Storage error"),
        }
    }

    #[test]
    fn interrupt_is_distinct_from_failure() {
        let err: HsError = ObjectiveError::Interrupted.into();
        assert!(matches!(
            err,
            HsError::Objective(ObjectiveError::Interrupted)
        ));
    }
}
