//! Suspend, resume, and terminate a spawned child process.
//!
//! All three controls are no-ops once the process has exited; exit races with
//! the owning worker are expected.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::debug;
use sysinfo::{Pid, ProcessStatus, System};

use crate::error::{Error, Result};

/// How long to keep reading a child's pipes after it has exited.
pub(crate) const OUTPUT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct ChildState {
    child: Child,
    exit: Option<ExitStatus>,
}

/// A spawned process shared between its owning worker and control callers.
#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    state: Mutex<ChildState>,
}

impl ChildProcess {
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        command.spawn().map(Self::from_child)
    }

    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            state: Mutex::new(ChildState { child, exit: None }),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn lock(&self) -> MutexGuard<'_, ChildState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Poll for exit without blocking.
    pub fn try_exit(&self) -> io::Result<Option<ExitStatus>> {
        let mut state = self.lock();
        refresh_exit(&mut state)
    }

    pub fn has_exited(&self) -> bool {
        matches!(self.try_exit(), Ok(Some(_)))
    }

    /// Halt every execution thread of the process without ending it.
    pub fn suspend(&self) -> Result<()> {
        // The lock is held across the call so the pid cannot be reaped and reused underneath us.
        let mut state = self.lock();
        if exited(&mut state) {
            return Ok(());
        }
        sys::suspend(self.pid)
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.lock();
        if exited(&mut state) {
            return Ok(());
        }
        sys::resume(self.pid)
    }

    /// Forcibly end the process. Returns `true` if a kill was delivered to a live process.
    pub fn terminate(&self) -> Result<bool> {
        let mut state = self.lock();
        if exited(&mut state) {
            return Ok(false);
        }
        match state.child.kill() {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(false),
            Err(err) => Err(Error::execution(
                format!("terminate pid {}", self.pid),
                err.to_string(),
            )),
        }
    }

    /// Start draining stdout and stderr so the child never blocks on a full pipe.
    pub fn capture_output(&self) -> OutputCapture {
        let mut state = self.lock();
        OutputCapture {
            stdout: state.child.stdout.take().map(drain),
            stderr: state.child.stderr.take().map(drain),
        }
    }
}

fn refresh_exit(state: &mut ChildState) -> io::Result<Option<ExitStatus>> {
    if state.exit.is_none() {
        state.exit = state.child.try_wait()?;
    }
    Ok(state.exit)
}

fn exited(state: &mut ChildState) -> bool {
    // An unreadable status is treated as still running; the signal call decides.
    matches!(refresh_exit(state), Ok(Some(_)))
}

/// Bytes read from one stream on a background thread.
#[derive(Debug)]
pub struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> StreamCapture {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done) = mpsc::channel();
    let sink = Arc::clone(&buffer);
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!("stopped reading child stream: {err}");
                    break;
                }
            }
        }
        let _ = done_tx.send(());
    });
    StreamCapture { buffer, done }
}

impl StreamCapture {
    /// Wait up to `grace` for end-of-stream, then return whatever was read.
    ///
    /// Grandchildren can inherit the pipe and keep it open after the child exits.
    pub fn collect(self, grace: Duration) -> Vec<u8> {
        let _ = self.done.recv_timeout(grace);
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.clone()
    }
}

#[derive(Debug)]
pub struct OutputCapture {
    stdout: Option<StreamCapture>,
    stderr: Option<StreamCapture>,
}

impl OutputCapture {
    /// Returns `(stdout, stderr)` bytes.
    pub fn collect(self, grace: Duration) -> (Vec<u8>, Vec<u8>) {
        let stdout = self
            .stdout
            .map(|capture| capture.collect(grace))
            .unwrap_or_default();
        let stderr = self
            .stderr
            .map(|capture| capture.collect(grace))
            .unwrap_or_default();
        (stdout, stderr)
    }
}

/// Process state as the operating system reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    Running,
    Stopped,
    Exited,
}

/// Look up `pid` in the OS process table.
pub fn observed_state(pid: u32) -> ObservedState {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return ObservedState::Exited;
    }
    match system.process(pid).map(|process| process.status()) {
        None | Some(ProcessStatus::Zombie) | Some(ProcessStatus::Dead) => ObservedState::Exited,
        Some(ProcessStatus::Stop) => ObservedState::Stopped,
        Some(_) => ObservedState::Running,
    }
}

#[cfg(unix)]
mod sys {
    use std::io;

    use libc::{self, c_int, pid_t};

    use crate::error::{Error, Result};

    pub fn suspend(pid: u32) -> Result<()> {
        signal(pid, libc::SIGSTOP, "SIGSTOP")
    }

    pub fn resume(pid: u32) -> Result<()> {
        signal(pid, libc::SIGCONT, "SIGCONT")
    }

    fn signal(pid: u32, signal: c_int, label: &str) -> Result<()> {
        let res = unsafe { libc::kill(pid as pid_t, signal) };
        if res != 0 {
            let errno = io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or_default();
            if errno == libc::ESRCH {
                return Ok(());
            }
            return Err(Error::execution(
                format!("send {label} to pid {pid}"),
                format!("errno {errno}"),
            ));
        }
        Ok(())
    }
}

#[cfg(windows)]
mod sys {
    use std::io;
    use std::mem;

    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First, Thread32Next,
    };
    use windows_sys::Win32::System::Threading::{
        OpenThread, ResumeThread, SuspendThread, THREAD_SUSPEND_RESUME,
    };

    use crate::error::{Error, Result};

    pub fn suspend(pid: u32) -> Result<()> {
        for_each_thread(pid, "suspend", |handle| unsafe { SuspendThread(handle) })
    }

    pub fn resume(pid: u32) -> Result<()> {
        for_each_thread(pid, "resume", |handle| unsafe { ResumeThread(handle) })
    }

    fn for_each_thread(pid: u32, label: &str, apply: impl Fn(HANDLE) -> u32) -> Result<()> {
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) };
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(Error::execution(
                format!("{label} threads of pid {pid}"),
                io::Error::last_os_error().to_string(),
            ));
        }

        let mut entry: THREADENTRY32 = unsafe { mem::zeroed() };
        entry.dwSize = mem::size_of::<THREADENTRY32>() as u32;

        let mut failed = 0usize;
        let mut more = unsafe { Thread32First(snapshot, &mut entry) } != 0;
        while more {
            if entry.th32OwnerProcessID == pid {
                let handle = unsafe { OpenThread(THREAD_SUSPEND_RESUME, 0, entry.th32ThreadID) };
                // Threads that exit between the snapshot and here cannot be opened.
                if handle != 0 {
                    if apply(handle) == u32::MAX {
                        failed += 1;
                    }
                    unsafe { CloseHandle(handle) };
                }
            }
            more = unsafe { Thread32Next(snapshot, &mut entry) } != 0;
        }
        unsafe { CloseHandle(snapshot) };

        if failed > 0 {
            return Err(Error::execution(
                format!("{label} threads of pid {pid}"),
                format!("{failed} thread(s) rejected the request"),
            ));
        }
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
mod sys {
    use crate::error::{Error, Result};

    pub fn suspend(_pid: u32) -> Result<()> {
        Err(Error::Unsupported {
            operation: "Suspending a process",
        })
    }

    pub fn resume(_pid: u32) -> Result<()> {
        Err(Error::Unsupported {
            operation: "Resuming a process",
        })
    }
}
