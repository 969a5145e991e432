//! Error types for job, workflow and build target handling.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Invalid batch job: {0}")]
    InvalidJob(String),

    #[error("Invalid wall time: {0}")]
    InvalidWalltime(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Duplicate target: {0}")]
    DuplicateTarget(String),

    #[error("Target {target} depends on unknown target {prerequisite}")]
    UnknownPrerequisite { target: String, prerequisite: String },

    #[error("Cycle detected in target prerequisites at {0}")]
    Cycle(String),

    #[error("Undefined variable $({variable}) in target {target}")]
    UndefinedVariable { variable: String, target: String },

    #[error("Target {target} failed with exit code {exit_code}: {command}")]
    CommandFailed {
        target: String,
        command: String,
        exit_code: i32,
    },

    #[error("Batch submission failed: {0}")]
    SubmitFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LaunchError>;
