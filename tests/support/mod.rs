#![allow(dead_code)]

use std::error::Error;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use wslctl::core::{ControlProgram, Event};

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const LOG_FILE: &str = "invocations.log";

/// Stand-in control program. Each invocation is classified into a key, then the
/// script replays `<key>.out` on stdout and `<key>.err` on stderr, after an
/// optional `<key>.sleep`, and exits with `<key>.exit` (default 0).
const SCRIPT: &str = r#"#!/bin/sh
dir=$(dirname "$0")
printf '%s\n' "$*" >> "$dir/invocations.log"
case "$*" in
  "-l -q") key=quiet ;;
  "-l -v") key=verbose ;;
  "--list --online") key=online ;;
  --install*) key=install ;;
  "--terminate "*) key=terminate ;;
  "--shutdown") key=shutdown ;;
  "-d "*" --exec echo WSL started") key=start ;;
  *) key=other ;;
esac
if [ -f "$dir/$key.sleep" ]; then sleep "$(cat "$dir/$key.sleep")"; fi
if [ -f "$dir/$key.out" ]; then cat "$dir/$key.out"; fi
if [ -f "$dir/$key.err" ]; then cat "$dir/$key.err" >&2; fi
if [ -f "$dir/$key.exit" ]; then exit "$(cat "$dir/$key.exit")"; fi
exit 0
"#;

pub fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

#[derive(Debug)]
pub struct FakeWsl {
    dir: TempDir,
    program: PathBuf,
}

impl FakeWsl {
    pub fn new() -> TestResult<Self> {
        let dir = TempDir::new()?;
        let program = dir.path().join("wsl.exe");
        fs::write(&program, SCRIPT)?;
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))?;
        let fake = Self { dir, program };
        fake.wait_until_executable()?;
        Ok(fake)
    }

    /// Forks from parallel tests can briefly hold the script's write handle open.
    fn wait_until_executable(&self) -> TestResult {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            match Command::new(&self.program).arg("--probe").output() {
                Ok(_) => break,
                Err(err) if err.raw_os_error() == Some(libc::ETXTBSY) && Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) => return Err(err.into()),
            }
        }
        let log = self.dir.path().join(LOG_FILE);
        if log.exists() {
            fs::remove_file(log)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.program
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn control(&self) -> ControlProgram {
        ControlProgram::new(&self.program)
    }

    /// Reply to `key` with `stdout` encoded the way the real program does.
    pub fn respond(&self, key: &str, stdout: &str) -> TestResult {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(utf16le(stdout));
        fs::write(self.dir.path().join(format!("{key}.out")), bytes)?;
        Ok(())
    }

    pub fn fail(&self, key: &str, code: i32, stderr: &str) -> TestResult {
        fs::write(self.dir.path().join(format!("{key}.err")), stderr)?;
        self.exit_with(key, code)
    }

    pub fn exit_with(&self, key: &str, code: i32) -> TestResult {
        fs::write(self.dir.path().join(format!("{key}.exit")), code.to_string())?;
        Ok(())
    }

    pub fn delay(&self, key: &str, seconds: &str) -> TestResult {
        fs::write(self.dir.path().join(format!("{key}.sleep")), seconds)?;
        Ok(())
    }

    pub fn invocations(&self) -> TestResult<Vec<String>> {
        match fs::read_to_string(self.dir.path().join(LOG_FILE)) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Configuration file pointing at this fake, plus `extra` TOML lines.
    pub fn write_config(&self, extra: &str) -> TestResult<PathBuf> {
        let path = self.dir.path().join("config.toml");
        let contents = format!(
            "control_program = \"{}\"\npoll_interval_ms = 20\n{extra}",
            self.program.display()
        );
        fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Collect events until `done` matches one of them or the timeout elapses.
pub fn events_until(
    rx: &Receiver<Event>,
    timeout: Duration,
    done: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(event) => {
                let finished = done(&event);
                events.push(event);
                if finished {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    events
}

/// Poll `check` until it holds or the timeout elapses.
pub fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    check()
}
