use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Run state of a distribution as reported by the control program at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
    Unknown,
}

impl RunState {
    /// Map the state column of a verbose listing. Anything other than the two
    /// well-known values (installing, converting, localized labels) is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("running") {
            RunState::Running
        } else if raw.eq_ignore_ascii_case("stopped") {
            RunState::Stopped
        } else {
            RunState::Unknown
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "Running",
            RunState::Stopped => "Stopped",
            RunState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a status query. `detail` explains why the state is `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub detail: Option<String>,
}

impl RunStatus {
    pub fn known(state: RunState) -> Self {
        Self {
            state,
            detail: None,
        }
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            state: RunState::Unknown,
            detail: Some(detail.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({detail})", self.state),
            None => write!(f, "{}", self.state),
        }
    }
}

/// A registered distribution, assembled per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub name: String,
    pub friendly_name: String,
    pub description: String,
    pub installed: bool,
    pub is_default: bool,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Distribution {
    pub(crate) fn installed(name: &str, is_default: bool, status: RunStatus) -> Self {
        Self {
            name: name.to_string(),
            friendly_name: name.to_string(),
            description: String::new(),
            installed: true,
            is_default,
            state: status.state,
            detail: status.detail,
        }
    }

    /// Borrow friendly name and description from the catalog entry with the same name.
    pub fn enrich_from_catalog(&mut self, catalog: &[CatalogEntry]) {
        if let Some(entry) = catalog
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(&self.name))
        {
            self.friendly_name = entry.friendly_name.clone();
            if self.description.is_empty() {
                self.description = entry.description.clone();
            }
        }
    }
}

/// A distribution offered by the online catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub friendly_name: String,
    pub description: String,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        let friendly_name = friendly_name.into();
        Self {
            name: name.into(),
            description: format!("{friendly_name} distribution"),
            friendly_name,
        }
    }
}

/// Catalog entry joined with the registry at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogAvailability {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub installed: bool,
}

/// Names returned by a quiet listing, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstalledList {
    pub names: Vec<String>,
    pub default: Option<String>,
}

impl InstalledList {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known.eq_ignore_ascii_case(name))
    }

    pub fn is_default(&self, name: &str) -> bool {
        self.default
            .as_deref()
            .is_some_and(|default| default.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// One data row of a verbose listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerboseRow {
    pub name: String,
    pub state: RunState,
    pub raw_state: String,
    pub version: Option<String>,
    pub is_default: bool,
}

impl VerboseRow {
    pub fn status(&self) -> RunStatus {
        match self.state {
            RunState::Unknown => RunStatus::unknown(format!("reported as `{}`", self.raw_state)),
            state => RunStatus::known(state),
        }
    }
}

/// Trim a user-supplied distribution name and reject values the control program cannot address.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(trimmed)
}
