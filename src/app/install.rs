use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use log::warn;

use crate::Result;
use crate::cli::InstallArgs;
use crate::core::{Installer, validate_name};

use super::common::{ConsoleReporter, Session};

/// A line typed on stdin while an install runs in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Toggle,
    Cancel,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "pause" | "p" => Some(Self::Pause),
            "resume" | "r" => Some(Self::Resume),
            "" => Some(Self::Toggle),
            "cancel" | "c" | "q" => Some(Self::Cancel),
            _ => None,
        }
    }
}

pub fn handle_install(args: InstallArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let catalog_name = validate_name(&args.catalog_name)?;
    let session = Session::open(config_override)?;
    let installer = session.installer(Arc::new(ConsoleReporter::new()));

    let install_name = match &args.name {
        Some(name) => validate_name(name)?.to_string(),
        None => installer.suggest_install_name(catalog_name)?,
    };

    let ticket = installer.begin(catalog_name, &install_name)?;
    println!(
        "Installing `{catalog_name}` as `{install_name}` via `{}`.",
        ticket.command()
    );
    println!("Type `pause`, `resume`, or `cancel` and press Enter (Enter alone toggles pause). Ctrl-C cancels.");

    let interrupt_installer = installer.clone();
    let interrupt_name = install_name.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        interrupt_installer.cancel(&interrupt_name);
    }) {
        warn!("Ctrl-C will not cancel the install: {err}");
    }

    spawn_stdin_control(installer, install_name);

    ticket.wait()?;
    Ok(())
}

fn spawn_stdin_control(installer: Installer, install_name: String) {
    let spawned = thread::Builder::new()
        .name("install-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if !installer.is_active(&install_name) {
                    break;
                }
                let Some(command) = ControlCommand::parse(&line) else {
                    eprintln!("Unrecognized command `{}`; use pause, resume, or cancel.", line.trim());
                    continue;
                };
                apply(&installer, &install_name, command);
            }
        });
    if let Err(err) = spawned {
        warn!("interactive install controls unavailable: {err}");
    }
}

fn apply(installer: &Installer, install_name: &str, command: ControlCommand) {
    let result = match command {
        ControlCommand::Pause => installer.pause(install_name).map(|_| ()),
        ControlCommand::Resume => installer.resume(install_name).map(|_| ()),
        ControlCommand::Toggle => installer.toggle_pause(install_name).map(|_| ()),
        ControlCommand::Cancel => {
            installer.cancel(install_name);
            Ok(())
        }
    };
    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
}
