use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 10;

/// Overrides the resolved control program path when set.
pub const CONTROL_PROGRAM_ENV: &str = "WSLCTL_CONTROL_PROGRAM";
/// Points at a configuration file to use instead of the per-user default.
pub const CONFIG_PATH_ENV: &str = "WSLCTL_CONFIG";

const POLL_INTERVAL_RANGE_MS: (u64, u64) = (10, 5_000);
const LAUNCH_TIMEOUT_RANGE_SECS: (u64, u64) = (1, 600);

/// Source used when resolving the configuration.
#[derive(Debug, Clone, Default)]
pub enum ConfigSource {
    /// Use `$WSLCTL_CONFIG` or the per-user configuration file if present.
    #[default]
    Default,
    /// Use an explicit path to the configuration file.
    Explicit(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// File the configuration was read from, if any.
    pub file_path: Option<PathBuf>,
    /// Explicit control program path. When absent the path is derived from the host layout.
    pub control_program: Option<PathBuf>,
    pub poll_interval: Duration,
    pub launch_timeout: Duration,
    pub terminal: TerminalCommand,
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_path: None,
            control_program: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            launch_timeout: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
            terminal: TerminalCommand::default(),
            warnings: Vec::new(),
        }
    }
}

/// Shell wrapper used to keep an interactive terminal window open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for TerminalCommand {
    fn default() -> Self {
        Self {
            program: "cmd.exe".to_string(),
            args: vec!["/k".to_string()],
        }
    }
}

pub fn load_config(source: &ConfigSource) -> Result<Config> {
    let mut config = match source {
        ConfigSource::Explicit(path) => {
            if !path.is_file() {
                return Err(Error::ExplicitConfigMissing { path: path.clone() });
            }
            load_config_file(path)?
        }
        ConfigSource::Default => match default_config_path() {
            Some(path) if path.is_file() => load_config_file(&path)?,
            _ => Config::default(),
        },
    };

    if let Some(program) = env::var_os(CONTROL_PROGRAM_ENV).filter(|value| !value.is_empty()) {
        config.control_program = Some(PathBuf::from(program));
    }

    Ok(config)
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let value: toml::Value = toml::from_str(&contents).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    let mut warnings = detect_unknown_fields(&value);

    let raw = RawConfig::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;

    raw.into_validated(path, &mut warnings)
}

/// Per-user configuration path, honouring `$WSLCTL_CONFIG`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_PATH_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(explicit));
    }

    let base = if cfg!(windows) {
        env::var_os("APPDATA").map(PathBuf::from)
    } else {
        env::var_os("XDG_CONFIG_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    }?;

    Some(base.join("wslctl").join("config.toml"))
}

fn invalid_config(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn detect_unknown_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let allowed_root = [
        "control_program",
        "poll_interval_ms",
        "launch_timeout_secs",
        "terminal",
    ];

    if let toml::Value::Table(table) = value {
        warn_table(table, &allowed_root, "root", &mut warnings);

        if let Some(terminal) = table.get("terminal") {
            if let toml::Value::Table(terminal_table) = terminal {
                warn_table(
                    terminal_table,
                    &["program", "args"],
                    "[terminal]",
                    &mut warnings,
                );
            } else {
                warnings.push("Expected [terminal] to be a table.".to_string());
            }
        }
    }

    warnings
}

fn warn_table(
    table: &toml::map::Map<String, toml::Value>,
    allowed: &[&str],
    context: &str,
    warnings: &mut Vec<String>,
) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            warnings.push(format!(
                "Unknown field `{key}` at {context}; this value will be ignored."
            ));
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    control_program: Option<PathBuf>,
    poll_interval_ms: Option<u64>,
    launch_timeout_secs: Option<u64>,
    terminal: Option<RawTerminal>,
}

#[derive(Debug, Deserialize)]
struct RawTerminal {
    program: Option<String>,
    args: Option<Vec<String>>,
}

impl RawConfig {
    fn into_validated(self, path: &Path, warnings: &mut Vec<String>) -> Result<Config> {
        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let (min_poll, max_poll) = POLL_INTERVAL_RANGE_MS;
        if !(min_poll..=max_poll).contains(&poll_interval_ms) {
            return Err(invalid_config(
                path,
                format!(
                    "`poll_interval_ms` must be between {min_poll} and {max_poll} (got {poll_interval_ms})."
                ),
            ));
        }

        let launch_timeout_secs = self
            .launch_timeout_secs
            .unwrap_or(DEFAULT_LAUNCH_TIMEOUT_SECS);
        let (min_timeout, max_timeout) = LAUNCH_TIMEOUT_RANGE_SECS;
        if !(min_timeout..=max_timeout).contains(&launch_timeout_secs) {
            return Err(invalid_config(
                path,
                format!(
                    "`launch_timeout_secs` must be between {min_timeout} and {max_timeout} (got {launch_timeout_secs})."
                ),
            ));
        }

        let terminal = match self.terminal {
            None => TerminalCommand::default(),
            Some(raw) => {
                let defaults = TerminalCommand::default();
                let program = match raw.program {
                    Some(program) if program.trim().is_empty() => {
                        return Err(invalid_config(
                            path,
                            "`terminal.program` must not be empty. Example: `program = \"cmd.exe\"`.",
                        ));
                    }
                    Some(program) => program,
                    None => defaults.program,
                };
                TerminalCommand {
                    program,
                    args: raw.args.unwrap_or(defaults.args),
                }
            }
        };

        let control_program = match self.control_program {
            Some(program) if program.as_os_str().is_empty() => {
                warnings.push(
                    "`control_program` is empty; falling back to the detected location."
                        .to_string(),
                );
                None
            }
            Some(program) if program.is_relative() => {
                let root = path.parent().unwrap_or_else(|| Path::new("."));
                Some(root.join(program))
            }
            other => other,
        };

        Ok(Config {
            file_path: Some(path.to_path_buf()),
            control_program,
            poll_interval: Duration::from_millis(poll_interval_ms),
            launch_timeout: Duration::from_secs(launch_timeout_secs),
            terminal,
            warnings: std::mem::take(warnings),
        })
    }
}
