//! Background installation of catalog distributions.
//!
//! Each [`Installer::begin`] registers an operation under its install name and
//! hands the control program run to a dedicated worker thread. Callers steer the
//! operation by name (pause, resume, cancel) and collect the outcome through the
//! returned [`InstallTicket`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConflictReason, Error, Result};

use super::control::{ControlProgram, describe_failure};
use super::distro::validate_name;
use super::events::{Event, InstallOutcome, InstallPhase};
use super::parse;
use super::process::{ChildProcess, OUTPUT_GRACE, ObservedState, observed_state};
use super::registry::Registry;
use super::reporter::Reporter;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a cancelled child may take to exit before the worker stops waiting on it.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Control program arguments that install `catalog_name` under `install_name`.
pub fn install_args(catalog_name: &str, install_name: &str) -> Vec<String> {
    let mut args = vec![
        "--install".to_string(),
        "-d".to_string(),
        catalog_name.to_string(),
    ];
    if !install_name.eq_ignore_ascii_case(catalog_name) {
        args.push("--name".to_string());
        args.push(install_name.to_string());
    }
    args
}

/// First name derived from `catalog_name` that is not in `taken`.
///
/// Comparison is case-insensitive; suffixes start at `-2`.
pub fn resolve_install_name<S: AsRef<str>>(catalog_name: &str, taken: &[S]) -> String {
    let base = catalog_name.trim();
    let is_taken = |candidate: &str| {
        taken
            .iter()
            .any(|name| name.as_ref().trim().eq_ignore_ascii_case(candidate))
    };

    if !is_taken(base) {
        return base.to_string();
    }
    let mut suffix = 2u32;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !is_taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

fn key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[derive(Debug)]
struct InstallOperation {
    install_name: String,
    catalog_name: String,
    cancel_requested: AtomicBool,
    paused: AtomicBool,
    finished: AtomicBool,
    process: Mutex<Option<Arc<ChildProcess>>>,
    phase: Mutex<InstallPhase>,
}

impl InstallOperation {
    fn new(catalog_name: &str, install_name: &str) -> Self {
        Self {
            install_name: install_name.to_string(),
            catalog_name: catalog_name.to_string(),
            cancel_requested: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            process: Mutex::new(None),
            phase: Mutex::new(InstallPhase::Preparing),
        }
    }

    fn process(&self) -> Option<Arc<ChildProcess>> {
        self.process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn phase(&self) -> InstallPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: InstallPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Read-only view of an in-flight install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSnapshot {
    pub install_name: String,
    pub catalog_name: String,
    pub phase: InstallPhase,
    pub paused: bool,
    pub cancel_requested: bool,
    /// Absent until the control program has been spawned.
    pub pid: Option<u32>,
    /// What the OS process table reports for `pid`.
    pub observed: Option<ObservedState>,
}

/// Handle returned by [`Installer::begin`]; resolves when the worker finishes.
#[derive(Debug)]
pub struct InstallTicket {
    install_name: String,
    command: String,
    outcome: Receiver<InstallOutcome>,
}

impl InstallTicket {
    pub fn install_name(&self) -> &str {
        &self.install_name
    }

    /// Rendered control program invocation, for messages.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Block until the operation reaches a terminal state.
    pub fn wait_outcome(self) -> InstallOutcome {
        self.outcome
            .recv()
            .unwrap_or_else(|_| InstallOutcome::Failed {
                detail: "install worker stopped without reporting an outcome".to_string(),
            })
    }

    /// Block until done, mapping cancellation and failure to errors.
    pub fn wait(self) -> Result<()> {
        let name = self.install_name.clone();
        let command = self.command.clone();
        match self.wait_outcome() {
            InstallOutcome::Completed => Ok(()),
            InstallOutcome::Cancelled => Err(Error::OperationCancelled { name }),
            InstallOutcome::Failed { detail } => Err(Error::execution(command, detail)),
        }
    }
}

type ActiveMap = Arc<Mutex<HashMap<String, Arc<InstallOperation>>>>;

/// Owns every in-flight install operation, keyed by install name.
#[derive(Clone)]
pub struct Installer {
    registry: Registry,
    poll_interval: Duration,
    reporter: Arc<dyn Reporter>,
    active: ActiveMap,
}

impl Installer {
    pub fn new(registry: Registry, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            registry,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reporter,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(control: ControlProgram, config: &Config, reporter: Arc<dyn Reporter>) -> Self {
        Self::new(Registry::new(control), reporter).with_poll_interval(config.poll_interval)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, Arc<InstallOperation>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, name: &str) -> Option<Arc<InstallOperation>> {
        self.lock_active().get(&key(name)).cloned()
    }

    fn report_phase(&self, op: &InstallOperation, phase: InstallPhase) {
        op.set_phase(phase);
        self.reporter.report(Event::InstallProgress {
            install_name: op.install_name.clone(),
            phase,
        });
    }

    /// Name to offer for a fresh install of `catalog_name`, skipping installed and in-flight names.
    pub fn suggest_install_name(&self, catalog_name: &str) -> Result<String> {
        let catalog_name = validate_name(catalog_name)?;
        let mut taken = self.registry.list_installed()?.names;
        taken.extend(
            self.lock_active()
                .values()
                .map(|op| op.install_name.clone()),
        );
        Ok(resolve_install_name(catalog_name, &taken))
    }

    /// Register and start an install. Returns as soon as the worker is running.
    pub fn begin(&self, catalog_name: &str, install_name: &str) -> Result<InstallTicket> {
        let catalog_name = validate_name(catalog_name)?;
        let install_name = validate_name(install_name)?;

        // Reserve the name before consulting the registry.
        let op = Arc::new(InstallOperation::new(catalog_name, install_name));
        {
            let mut active = self.lock_active();
            let key = key(install_name);
            if active.contains_key(&key) {
                return Err(Error::NameConflict {
                    name: install_name.to_string(),
                    reason: ConflictReason::InProgress,
                });
            }
            active.insert(key, Arc::clone(&op));
        }

        match self.registry.list_installed() {
            Ok(installed) if installed.contains(install_name) => {
                self.release(&op);
                return Err(Error::NameConflict {
                    name: install_name.to_string(),
                    reason: ConflictReason::Installed,
                });
            }
            Ok(_) => {}
            Err(err) => {
                self.release(&op);
                return Err(err);
            }
        }

        let args = install_args(catalog_name, install_name);
        let command = self.registry.control().describe(&args);
        info!("starting install of `{catalog_name}` as `{install_name}`");
        self.report_phase(&op, InstallPhase::Preparing);

        let (outcome_tx, outcome_rx) = mpsc::channel();
        let worker = self.clone();
        let worker_op = Arc::clone(&op);
        let spawned = thread::Builder::new()
            .name(format!("install-{install_name}"))
            .spawn(move || worker.run(worker_op, args, outcome_tx));

        if let Err(err) = spawned {
            self.release(&op);
            return Err(Error::execution(
                command,
                format!("unable to start install worker: {err}"),
            ));
        }

        Ok(InstallTicket {
            install_name: install_name.to_string(),
            command,
            outcome: outcome_rx,
        })
    }

    /// Drop `op` from the active map, leaving any newer operation under the same name alone.
    fn release(&self, op: &Arc<InstallOperation>) {
        let mut active = self.lock_active();
        let key = key(&op.install_name);
        if active.get(&key).is_some_and(|current| Arc::ptr_eq(current, op)) {
            active.remove(&key);
        }
    }

    fn run(&self, op: Arc<InstallOperation>, args: Vec<String>, outcome_tx: Sender<InstallOutcome>) {
        let outcome = self.drive(&op, &args);
        self.finish(&op, &outcome);
        // The ticket may have been dropped; the outcome was already reported.
        let _ = outcome_tx.send(outcome);
    }

    fn drive(&self, op: &InstallOperation, args: &[String]) -> InstallOutcome {
        if op.cancel_requested() {
            return InstallOutcome::Cancelled;
        }

        let control = self.registry.control();
        let mut command = control.command(args);
        let process = match ChildProcess::spawn(&mut command) {
            Ok(process) => Arc::new(process),
            Err(err) => {
                return InstallOutcome::Failed {
                    detail: format!("unable to start {}: {err}", control.path().display()),
                };
            }
        };
        debug!(
            "`{}` running as pid {}",
            control.describe(args),
            process.pid()
        );
        let capture = process.capture_output();
        // Reported before the process is published so a pause cannot be overwritten.
        if !op.cancel_requested() {
            self.report_phase(op, InstallPhase::Installing);
        }
        *op.process.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&process));

        // A cancel that raced the spawn saw no process to terminate.
        if op.cancel_requested() {
            if let Err(err) = process.terminate() {
                warn!("failed to stop install `{}`: {err}", op.install_name);
            }
        }

        let mut cancel_seen: Option<Instant> = None;
        loop {
            match process.try_exit() {
                Ok(Some(status)) => {
                    let (stdout, stderr) = capture.collect(OUTPUT_GRACE);
                    if op.cancel_requested() {
                        return InstallOutcome::Cancelled;
                    }
                    if status.success() {
                        return InstallOutcome::Completed;
                    }
                    return InstallOutcome::Failed {
                        detail: describe_failure(
                            status,
                            &parse::decode_lenient(&stderr),
                            &parse::decode_lenient(&stdout),
                        ),
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    let _ = process.terminate();
                    if op.cancel_requested() {
                        return InstallOutcome::Cancelled;
                    }
                    return InstallOutcome::Failed {
                        detail: format!("lost track of pid {}: {err}", process.pid()),
                    };
                }
            }

            if op.cancel_requested() {
                let since = *cancel_seen.get_or_insert_with(Instant::now);
                if since.elapsed() >= CANCEL_GRACE {
                    warn!(
                        "install `{}` (pid {}) still running after cancel; abandoning it",
                        op.install_name,
                        process.pid()
                    );
                    return InstallOutcome::Cancelled;
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn finish(&self, op: &Arc<InstallOperation>, outcome: &InstallOutcome) {
        op.finished.store(true, Ordering::SeqCst);
        op.paused.store(false, Ordering::SeqCst);
        self.release(op);

        match outcome {
            InstallOutcome::Failed { detail } => {
                warn!("install `{}` failed: {detail}", op.install_name)
            }
            other => info!("install `{}` {}", op.install_name, other.describe()),
        }

        self.report_phase(op, InstallPhase::Done);
        self.reporter.report(Event::InstallFinished {
            install_name: op.install_name.clone(),
            outcome: outcome.clone(),
        });

        if outcome.is_success() {
            let status = self.registry.status(&op.install_name);
            self.reporter.report(Event::StatusChanged {
                distro: op.install_name.clone(),
                state: status.state,
                previous: None,
                detail: status.detail,
            });
        }
    }

    /// Request cancellation. Returns `false` when no install named `name` is active.
    ///
    /// Repeated calls are harmless; the child is terminated even while paused.
    /// If the child has not exited within five seconds of the request, the
    /// operation is reported `Cancelled` and its name is freed anyway, so a new
    /// install may reuse the name before the abandoned child has exited.
    pub fn cancel(&self, name: &str) -> bool {
        let Some(op) = self.lookup(name) else {
            debug!("cancel ignored: no active install named `{}`", name.trim());
            return false;
        };
        if !op.cancel_requested.swap(true, Ordering::SeqCst) {
            info!("cancelling install `{}`", op.install_name);
        }
        if let Some(process) = op.process() {
            if let Err(err) = process.terminate() {
                warn!("failed to stop install `{}`: {err}", op.install_name);
            }
        }
        true
    }

    /// Suspend the running install. Returns `Ok(false)` when there is nothing to pause.
    pub fn pause(&self, name: &str) -> Result<bool> {
        let Some((op, process)) = self.controllable(name, "pause") else {
            return Ok(false);
        };
        if op
            .paused
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        if let Err(err) = process.suspend() {
            op.paused.store(false, Ordering::SeqCst);
            return Err(err);
        }
        info!("paused install `{}`", op.install_name);
        self.report_phase(&op, InstallPhase::Paused);
        Ok(true)
    }

    /// Continue a paused install. Returns `Ok(false)` when it was not paused.
    pub fn resume(&self, name: &str) -> Result<bool> {
        let Some((op, process)) = self.controllable(name, "resume") else {
            return Ok(false);
        };
        if op
            .paused
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        if let Err(err) = process.resume() {
            op.paused.store(true, Ordering::SeqCst);
            return Err(err);
        }
        info!("resumed install `{}`", op.install_name);
        self.report_phase(&op, InstallPhase::Installing);
        Ok(true)
    }

    /// Pause a running install or resume a paused one, returning the new phase.
    pub fn toggle_pause(&self, name: &str) -> Result<Option<InstallPhase>> {
        let paused = match self.lookup(name) {
            Some(op) => op.paused.load(Ordering::SeqCst),
            None => {
                warn!("pause ignored: no active install named `{}`", name.trim());
                return Ok(None);
            }
        };
        if paused {
            Ok(self.resume(name)?.then_some(InstallPhase::Installing))
        } else {
            Ok(self.pause(name)?.then_some(InstallPhase::Paused))
        }
    }

    fn controllable(
        &self,
        name: &str,
        action: &str,
    ) -> Option<(Arc<InstallOperation>, Arc<ChildProcess>)> {
        let Some(op) = self.lookup(name) else {
            warn!("{action} ignored: no active install named `{}`", name.trim());
            return None;
        };
        if op.is_finished() || op.cancel_requested() {
            warn!("{action} ignored: install `{}` is ending", op.install_name);
            return None;
        }
        let Some(process) = op.process() else {
            warn!("{action} ignored: install `{}` has not started yet", op.install_name);
            return None;
        };
        Some((op, process))
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Snapshots of every in-flight install, ordered by install name.
    pub fn active(&self) -> Vec<InstallSnapshot> {
        let ops: Vec<Arc<InstallOperation>> = self.lock_active().values().cloned().collect();
        let mut snapshots: Vec<InstallSnapshot> = ops
            .iter()
            .map(|op| {
                let pid = op.process().map(|process| process.pid());
                InstallSnapshot {
                    install_name: op.install_name.clone(),
                    catalog_name: op.catalog_name.clone(),
                    phase: op.phase(),
                    paused: op.paused.load(Ordering::SeqCst),
                    cancel_requested: op.cancel_requested(),
                    pid,
                    observed: pid.map(observed_state),
                }
            })
            .collect();
        snapshots.sort_by_key(|snapshot| key(&snapshot.install_name));
        snapshots
    }
}
