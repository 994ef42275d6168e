use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::Result;
use crate::config::{Config, ConfigSource, load_config};
use crate::core::events::{Event, Severity};
use crate::core::{Actions, ControlProgram, Installer, Registry, Reporter};

use super::display::{colorize, state_color};

pub fn config_source(config_override: Option<&PathBuf>) -> ConfigSource {
    match config_override {
        Some(path) => ConfigSource::Explicit(path.clone()),
        None => ConfigSource::Default,
    }
}

pub fn emit_config_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
}

/// Resolved configuration and control program shared by every command handler.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: Config,
    pub control: ControlProgram,
}

impl Session {
    pub fn open(config_override: Option<&PathBuf>) -> Result<Self> {
        let config = load_config(&config_source(config_override))?;
        emit_config_warnings(&config.warnings);
        if let Some(path) = &config.file_path {
            debug!("loaded configuration from {}", path.display());
        }
        let control = ControlProgram::from_config(&config);
        debug!("using control program {}", control.path().display());
        Ok(Self { config, control })
    }

    pub fn registry(&self) -> Registry {
        Registry::new(self.control.clone())
    }

    pub fn actions(&self) -> Actions {
        Actions::new(self.control.clone(), &self.config)
    }

    pub fn installer(&self, reporter: Arc<dyn Reporter>) -> Installer {
        Installer::from_config(self.control.clone(), &self.config, reporter)
    }
}

/// Prints events as timestamped lines; errors and warnings go to stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            color: io::stdout().is_terminal(),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: Event) {
        let line = format!("[{}] {}", timestamp(), describe_event(&event, self.color));
        match &event {
            Event::Message {
                severity: Severity::Warning | Severity::Error,
                ..
            } => eprintln!("{line}"),
            Event::InstallFinished { outcome, .. } if !outcome.is_success() => {
                eprintln!("{line}")
            }
            _ => println!("{line}"),
        }
    }
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default()
}

/// One-line rendering of an event, without timestamp.
pub fn describe_event(event: &Event, color: bool) -> String {
    match event {
        Event::Message { severity, text } => match severity {
            Severity::Info => text.clone(),
            Severity::Warning => format!("warning: {text}"),
            Severity::Error => format!("error: {text}"),
        },
        Event::StatusChanged {
            distro,
            state,
            previous,
            detail,
        } => {
            let current = colorize(state.as_str(), state_color(*state), color);
            let mut line = match previous {
                Some(previous) => format!("{distro}: {previous} -> {current}"),
                None => format!("{distro}: {current}"),
            };
            if let Some(detail) = detail {
                line.push_str(&format!(" ({detail})"));
            }
            line
        }
        Event::DistroRemoved { distro } => format!("{distro}: removed"),
        Event::InstallProgress {
            install_name,
            phase,
        } => format!("{install_name}: {phase}"),
        Event::InstallFinished {
            install_name,
            outcome,
        } => format!("{install_name}: install {outcome}"),
    }
}
