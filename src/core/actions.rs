use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::{Config, TerminalCommand};
use crate::error::{Error, Result};

use super::control::{ControlProgram, describe_failure};
use super::distro::validate_name;
use super::events::Event;
use super::parse;
use super::process::{ChildProcess, OUTPUT_GRACE};
use super::registry::Registry;
use super::reporter::Reporter;

pub const START_MESSAGE: &str = "WSL started";

/// Argument vector that boots `name` and exits once it is up.
pub fn start_args(name: &str) -> [&str; 5] {
    ["-d", name, "--exec", "echo", START_MESSAGE]
}

/// Command line the terminal wrapper executes, e.g. `"C:\...\wsl.exe" -d Ubuntu`.
pub fn terminal_command_line(control: &ControlProgram, name: &str) -> String {
    format!("\"{}\" -d {name}", control.path().display())
}

/// Start and stop operations for individual distributions.
#[derive(Debug, Clone)]
pub struct Actions {
    control: ControlProgram,
    terminal: TerminalCommand,
    launch_timeout: Duration,
    poll_interval: Duration,
}

impl Actions {
    pub fn new(control: ControlProgram, config: &Config) -> Self {
        Self {
            control,
            terminal: config.terminal.clone(),
            launch_timeout: config.launch_timeout,
            poll_interval: config.poll_interval,
        }
    }

    pub fn control(&self) -> &ControlProgram {
        &self.control
    }

    /// Open an interactive session in a terminal window that stays open after the shell exits.
    ///
    /// Returns the pid of the terminal wrapper once it has been spawned.
    pub fn open_terminal(&self, name: &str) -> Result<u32> {
        let name = validate_name(name)?;
        let line = terminal_command_line(&self.control, name);
        let mut command = Command::new(&self.terminal.program);
        command.args(&self.terminal.args);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;

            use super::control::CREATE_NEW_CONSOLE;
            // cmd.exe strips one pair of outer quotes from its command string.
            command
                .raw_arg(format!("\"{line}\""))
                .creation_flags(CREATE_NEW_CONSOLE);
        }
        #[cfg(not(windows))]
        command.arg(&line);

        let rendered = format!(
            "{} {} {line}",
            self.terminal.program,
            self.terminal.args.join(" ")
        );
        self.spawn_detached(command, rendered)
    }

    /// Run the distribution's default shell in a new console, detached.
    pub fn launch_direct(&self, name: &str) -> Result<u32> {
        let name = validate_name(name)?;
        let args = ["-d", name];
        let mut command = Command::new(self.control.path());
        command.args(args);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;

            use super::control::CREATE_NEW_CONSOLE;
            command.creation_flags(CREATE_NEW_CONSOLE);
        }
        self.spawn_detached(command, self.control.describe(&args))
    }

    fn spawn_detached(&self, mut command: Command, rendered: String) -> Result<u32> {
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let mut child = command
            .spawn()
            .map_err(|err| Error::execution(rendered.clone(), format!("unable to start: {err}")))?;
        let pid = child.id();
        info!("launched `{rendered}` as pid {pid}");

        // Nobody waits on a detached launch; reap it so it does not linger as a zombie.
        let reaper = thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!("detached pid {pid} exited with {status}"),
                Err(err) => debug!("lost track of detached pid {pid}: {err}"),
            });
        if let Err(err) = reaper {
            warn!("pid {pid} will not be reaped: {err}");
        }
        Ok(pid)
    }

    /// Boot `name` in the background and wait until it answers.
    pub fn start_background(&self, name: &str, reporter: Option<&dyn Reporter>) -> Result<()> {
        let name = validate_name(name)?;
        self.run_bounded(&start_args(name))?;
        info!("started `{name}`");
        self.report_status(name, reporter);
        Ok(())
    }

    /// Stop a single distribution.
    pub fn terminate(&self, name: &str, reporter: Option<&dyn Reporter>) -> Result<()> {
        let name = validate_name(name)?;
        self.run_bounded(&["--terminate", name])?;
        info!("terminated `{name}`");
        self.report_status(name, reporter);
        Ok(())
    }

    /// Stop every running distribution and the backing VM.
    pub fn shutdown_all(&self) -> Result<()> {
        self.run_bounded(&["--shutdown"])?;
        info!("shut down all distributions");
        Ok(())
    }

    fn report_status(&self, name: &str, reporter: Option<&dyn Reporter>) {
        let Some(reporter) = reporter else {
            return;
        };
        let status = Registry::new(self.control.clone()).status(name);
        reporter.report(Event::StatusChanged {
            distro: name.to_string(),
            state: status.state,
            previous: None,
            detail: status.detail,
        });
    }

    /// Run the control program and wait for it, killing it after `launch_timeout`.
    fn run_bounded(&self, args: &[&str]) -> Result<()> {
        let rendered = self.control.describe(args);
        debug!("running `{rendered}` with a {:?} limit", self.launch_timeout);

        let mut command = self.control.command(args);
        let process = ChildProcess::spawn(&mut command).map_err(|err| {
            Error::execution(
                rendered.clone(),
                format!("unable to start {}: {err}", self.control.path().display()),
            )
        })?;
        let capture = process.capture_output();
        let deadline = Instant::now() + self.launch_timeout;

        loop {
            match process.try_exit() {
                Ok(Some(status)) => {
                    let (stdout, stderr) = capture.collect(OUTPUT_GRACE);
                    if status.success() {
                        return Ok(());
                    }
                    return Err(Error::execution(
                        rendered,
                        describe_failure(
                            status,
                            &parse::decode_lenient(&stderr),
                            &parse::decode_lenient(&stdout),
                        ),
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = process.terminate();
                    return Err(Error::execution(
                        rendered,
                        format!("lost track of pid {}: {err}", process.pid()),
                    ));
                }
            }

            if Instant::now() >= deadline {
                let _ = process.terminate();
                return Err(Error::execution(
                    rendered,
                    format!(
                        "no response within {}s; the process was stopped",
                        self.launch_timeout.as_secs()
                    ),
                ));
            }
            thread::sleep(self.poll_interval);
        }
    }
}
