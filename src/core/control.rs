use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use log::debug;

use crate::config::Config;
use crate::error::{Error, Result};

use super::parse;

pub const CONTROL_PROGRAM_NAME: &str = "wsl.exe";

const DEFAULT_SYSTEM_ROOT: &str = r"C:\Windows";
const WOW64_ARCH_ENV: &str = "PROCESSOR_ARCHITEW6432";

#[cfg(windows)]
pub(crate) const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
pub(crate) const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;

/// Where the host keeps its system binaries, as seen by this process.
///
/// A 32-bit process on a 64-bit OS has `System32` redirected to the 32-bit
/// directory; the real one is only reachable through the `Sysnative` alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub system_root: PathBuf,
    pub process_is_64bit: bool,
    pub os_is_64bit: bool,
}

impl HostLayout {
    pub fn detect() -> Self {
        let process_is_64bit = cfg!(target_pointer_width = "64");
        let system_root = env::var_os("SystemRoot")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSTEM_ROOT));
        // A 64-bit process implies a 64-bit OS; a WOW64 process sees the native
        // architecture in PROCESSOR_ARCHITEW6432.
        let os_is_64bit =
            process_is_64bit || env::var_os(WOW64_ARCH_ENV).is_some_and(|arch| !arch.is_empty());

        Self {
            system_root,
            process_is_64bit,
            os_is_64bit,
        }
    }

    pub fn is_redirected(&self) -> bool {
        self.os_is_64bit && !self.process_is_64bit
    }

    pub fn system_dir(&self) -> PathBuf {
        if self.is_redirected() {
            self.system_root.join("Sysnative")
        } else {
            self.system_root.join("System32")
        }
    }

    pub fn control_program(&self) -> PathBuf {
        self.system_dir().join(CONTROL_PROGRAM_NAME)
    }
}

/// Captured result of one control program run.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Best available explanation for a failed run.
    pub fn failure_detail(&self) -> String {
        describe_failure(self.status, &self.stderr, &self.stdout)
    }
}

pub(crate) fn describe_failure(status: ExitStatus, stderr: &str, stdout: &str) -> String {
    let code = match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    };
    let message = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|text| !text.is_empty());
    match message {
        Some(message) => format!("{code}: {message}"),
        None => code,
    }
}

/// Resolved location of the control program, shared by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlProgram {
    path: PathBuf,
}

impl ControlProgram {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Locate the control program for this host.
    ///
    /// Windows goes through the system directory (respecting redirection);
    /// elsewhere (e.g. inside a distribution with interop) it is looked up on `PATH`.
    pub fn detect() -> Self {
        if cfg!(windows) {
            return Self::new(HostLayout::detect().control_program());
        }
        Self::new(find_executable(&[CONTROL_PROGRAM_NAME]).unwrap_or_else(|| {
            PathBuf::from(CONTROL_PROGRAM_NAME)
        }))
    }

    pub fn from_config(config: &Config) -> Self {
        match &config.control_program {
            Some(path) => Self::new(path.clone()),
            None => Self::detect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Human-readable rendering of an invocation, used in error messages.
    pub fn describe<S: AsRef<OsStr>>(&self, args: &[S]) -> String {
        let program = self
            .path
            .file_name()
            .unwrap_or(self.path.as_os_str())
            .to_string_lossy()
            .into_owned();
        let mut rendered = program;
        for arg in args {
            rendered.push(' ');
            rendered.push_str(&arg.as_ref().to_string_lossy());
        }
        rendered
    }

    /// Build a hidden, non-interactive invocation with captured output.
    pub fn command<S: AsRef<OsStr>>(&self, args: &[S]) -> Command {
        let mut command = Command::new(&self.path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(home) = user_home() {
            command.current_dir(home);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }
        command
    }

    /// Run to completion and capture both streams; the exit code is not checked.
    pub fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<CapturedOutput> {
        let rendered = self.describe(args);
        debug!("running `{rendered}` via {}", self.path.display());

        let output = self.command(args).output().map_err(|err| {
            Error::execution(
                rendered.clone(),
                format!("unable to start {}: {err}", self.path.display()),
            )
        })?;

        let captured = CapturedOutput {
            status: output.status,
            stdout: parse::decode_output(&output.stdout),
            stderr: parse::decode_lenient(&output.stderr),
        };
        debug!("`{rendered}` finished with {}", captured.status);
        Ok(captured)
    }

    /// Run and require a zero exit code, returning decoded stdout.
    pub fn run_checked<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String> {
        let captured = self.run(args)?;
        if !captured.status.success() {
            return Err(Error::execution(
                self.describe(args),
                captured.failure_detail(),
            ));
        }
        Ok(captured.stdout)
    }
}

pub(crate) fn user_home() -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .filter(|path| path.is_dir())
}

fn find_executable(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        for candidate in candidates {
            let full = dir.join(candidate);
            if full.is_file() {
                return Some(full);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(process_is_64bit: bool, os_is_64bit: bool) -> HostLayout {
        HostLayout {
            system_root: PathBuf::from(r"C:\Windows"),
            process_is_64bit,
            os_is_64bit,
        }
    }

    #[test]
    fn wow64_process_uses_sysnative() {
        let layout = layout(false, true);
        assert!(layout.is_redirected());
        assert!(layout.control_program().ends_with("wsl.exe"));
        assert!(layout.system_dir().ends_with("Sysnative"));
    }

    #[test]
    fn native_process_uses_system32() {
        assert!(layout(true, true).system_dir().ends_with("System32"));
        assert!(layout(false, false).system_dir().ends_with("System32"));
    }

    #[test]
    fn detect_honours_wow64_environment() {
        temp_env::with_vars(
            [(WOW64_ARCH_ENV, Some("AMD64")), ("SystemRoot", Some("D:\\Win"))],
            || {
                let layout = HostLayout::detect();
                assert!(layout.os_is_64bit);
                assert_eq!(layout.system_root, PathBuf::from("D:\\Win"));
            },
        );
    }

    #[test]
    fn describe_renders_file_name_and_args() {
        let program = ControlProgram::new("/mnt/c/Windows/System32/wsl.exe");
        assert_eq!(program.describe(&["-l", "-q"]), "wsl.exe -l -q");
    }

    #[cfg(unix)]
    #[test]
    fn describe_failure_prefers_stderr_then_stdout() {
        use std::os::unix::process::ExitStatusExt;

        let status = ExitStatus::from_raw(1 << 8);
        assert_eq!(describe_failure(status, " boom \n", "ignored"), "exit code 1: boom");
        assert_eq!(describe_failure(status, "", "from stdout"), "exit code 1: from stdout");
        assert_eq!(describe_failure(status, "", ""), "exit code 1");
        let killed = ExitStatus::from_raw(libc::SIGKILL);
        assert_eq!(describe_failure(killed, "", ""), "terminated by signal");
    }

    #[cfg(unix)]
    #[test]
    fn run_reports_spawn_failure_as_execution_failure() {
        let program = ControlProgram::new("/nonexistent/wsl.exe");
        match program.run(&["-l", "-q"]).unwrap_err() {
            Error::ExecutionFailure { command, detail } => {
                assert_eq!(command, "wsl.exe -l -q");
                assert!(detail.contains("unable to start"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
