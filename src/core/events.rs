use std::fmt;

use super::distro::RunState;

/// Severity of a free-form message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Structured notification delivered to a [`Reporter`](super::reporter::Reporter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A textual progress update with a severity level.
    Message { severity: Severity, text: String },
    /// A distribution's run state differs from what the observer last saw.
    StatusChanged {
        distro: String,
        state: RunState,
        /// State previously known to the observer; `None` for newly seen distributions.
        previous: Option<RunState>,
        /// Why the state is `Unknown`, when it is.
        detail: Option<String>,
    },
    /// A distribution disappeared from the installed listing.
    DistroRemoved { distro: String },
    /// An install operation moved to a new phase.
    InstallProgress {
        install_name: String,
        phase: InstallPhase,
    },
    /// An install operation reached a terminal state.
    InstallFinished {
        install_name: String,
        outcome: InstallOutcome,
    },
}

/// Human-readable phase of an install operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Preparing,
    Installing,
    Paused,
    Done,
}

impl InstallPhase {
    pub fn describe(self) -> &'static str {
        match self {
            InstallPhase::Preparing => "preparing",
            InstallPhase::Installing => "installing",
            InstallPhase::Paused => "paused",
            InstallPhase::Done => "done",
        }
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Terminal state of an install operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Completed,
    /// Stopped at the user's request; not an error.
    Cancelled,
    Failed { detail: String },
}

impl InstallOutcome {
    pub fn describe(&self) -> &'static str {
        match self {
            InstallOutcome::Completed => "completed",
            InstallOutcome::Cancelled => "cancelled",
            InstallOutcome::Failed { .. } => "failed",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            InstallOutcome::Failed { detail } => Some(detail),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Completed)
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {detail}", self.describe()),
            None => f.write_str(self.describe()),
        }
    }
}
