use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("`{command}` failed: {detail}")]
    ExecutionFailure { command: String, detail: String },
    #[error("The name `{name}` {reason}. Choose a different install name.")]
    NameConflict {
        name: String,
        reason: ConflictReason,
    },
    #[error("Installation of `{name}` was cancelled.")]
    OperationCancelled { name: String },
    #[error("{operation} is not supported on this platform.")]
    Unsupported { operation: &'static str },
    #[error("`{name}` is not a usable distribution name.")]
    InvalidName { name: String },
    #[error("Failed to read configuration file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration at {path} could not be parsed: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration at {path} is invalid: {message}")]
    InvalidConfig { path: PathBuf, message: String },
    #[error("The configuration path {path} does not exist or is not readable.")]
    ExplicitConfigMissing { path: PathBuf },
    #[error("Failed to render JSON output: {source}")]
    RenderJson {
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn execution(command: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Whether the error is an expected, user-initiated stop rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::OperationCancelled { .. })
    }
}

/// Why an install name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// A distribution with this name is already registered.
    Installed,
    /// Another install operation is currently using this name.
    InProgress,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::Installed => f.write_str("is already installed"),
            ConflictReason::InProgress => f.write_str("already has an install in progress"),
        }
    }
}
