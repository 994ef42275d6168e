#![cfg(unix)]

mod support;

use std::sync::{Arc, Barrier};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use wslctl::core::{
    Event, InstallOutcome, InstallPhase, Installer, ObservedState, Registry, RunState,
};
use wslctl::{ConflictReason, Error};

use support::{DEFAULT_TIMEOUT, FakeWsl, TestResult, eventually, events_until};

fn installer(fake: &FakeWsl) -> (Installer, Receiver<Event>) {
    let (tx, rx) = mpsc::channel();
    let installer = Installer::new(Registry::new(fake.control()), Arc::new(tx))
        .with_poll_interval(Duration::from_millis(20));
    (installer, rx)
}

fn is_finished(event: &Event) -> bool {
    matches!(event, Event::InstallFinished { .. })
}

fn wait_for_pid(installer: &Installer, name: &str) -> bool {
    eventually(DEFAULT_TIMEOUT, || {
        installer
            .active()
            .iter()
            .any(|snapshot| snapshot.install_name == name && snapshot.pid.is_some())
    })
}

#[test]
fn completed_install_reports_phases_and_new_status() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.respond("quiet", "Ubuntu\r\n")?;
    fake.respond("verbose", "NAME STATE VERSION\r\nUbuntu-2 Stopped 2\r\n")?;
    let (installer, rx) = installer(&fake);

    let ticket = installer.begin("Ubuntu", "Ubuntu-2")?;
    assert_eq!(ticket.install_name(), "Ubuntu-2");
    assert_eq!(ticket.command(), "wsl.exe --install -d Ubuntu --name Ubuntu-2");
    assert_eq!(ticket.wait_outcome(), InstallOutcome::Completed);

    let events = events_until(&rx, DEFAULT_TIMEOUT, |event| {
        matches!(event, Event::StatusChanged { .. })
    });
    let phases: Vec<InstallPhase> = events
        .iter()
        .filter_map(|event| match event {
            Event::InstallProgress { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![InstallPhase::Preparing, InstallPhase::Installing, InstallPhase::Done]
    );
    assert!(events.contains(&Event::InstallFinished {
        install_name: "Ubuntu-2".into(),
        outcome: InstallOutcome::Completed,
    }));
    assert_eq!(
        events.last(),
        Some(&Event::StatusChanged {
            distro: "Ubuntu-2".into(),
            state: RunState::Stopped,
            previous: None,
            detail: None,
        })
    );

    assert!(!installer.is_active("Ubuntu-2"));
    assert!(
        fake.invocations()?
            .contains(&"--install -d Ubuntu --name Ubuntu-2".to_string())
    );
    Ok(())
}

#[test]
fn matching_install_name_omits_name_flag() -> TestResult {
    let fake = FakeWsl::new()?;
    let (installer, _rx) = installer(&fake);

    installer.begin("Debian", "Debian")?.wait()?;
    assert!(fake.invocations()?.contains(&"--install -d Debian".to_string()));
    Ok(())
}

#[test]
fn installed_name_is_rejected() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.respond("quiet", "* Ubuntu\r\n")?;
    let (installer, _rx) = installer(&fake);

    match installer.begin("Ubuntu", "ubuntu") {
        Err(Error::NameConflict { name, reason }) => {
            assert_eq!(name, "ubuntu");
            assert_eq!(reason, ConflictReason::Installed);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(installer.active().is_empty());
    Ok(())
}

#[test]
fn second_begin_for_active_name_conflicts() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.delay("install", "3")?;
    let (installer, _rx) = installer(&fake);

    let ticket = installer.begin("Ubuntu", "Ubuntu")?;
    match installer.begin("Ubuntu", "UBUNTU") {
        Err(Error::NameConflict { reason, .. }) => assert_eq!(reason, ConflictReason::InProgress),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(installer.active().len(), 1);

    assert!(installer.cancel("Ubuntu"));
    assert!(ticket.wait().is_err_and(|err| err.is_cancellation()));
    Ok(())
}

#[test]
fn install_finishing_during_listing_does_not_admit_a_duplicate() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.delay("quiet", "0.6")?;
    fake.delay("install", "0.3")?;
    let (installer, _rx) = installer(&fake);

    let first = installer.begin("Ubuntu", "Ubuntu-2")?;
    assert!(installer.is_active("Ubuntu-2"));

    let second = {
        let installer = installer.clone();
        thread::spawn(move || installer.begin("Ubuntu", "Ubuntu-2"))
    };
    match second.join().map_err(|_| "second begin panicked")? {
        Err(Error::NameConflict { name, reason }) => {
            assert_eq!(name, "Ubuntu-2");
            assert_eq!(reason, ConflictReason::InProgress);
        }
        other => panic!("unexpected result: {other:?}"),
    }

    first.wait()?;
    let installs = fake
        .invocations()?
        .into_iter()
        .filter(|line| line.starts_with("--install"))
        .count();
    assert_eq!(installs, 1);
    Ok(())
}

#[test]
fn concurrent_begins_for_one_name_admit_exactly_one() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.delay("install", "3")?;
    let (installer, _rx) = installer(&fake);
    let callers = 4;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let installer = installer.clone();
            let barrier = Arc::clone(&barrier);
            let name = if i % 2 == 0 { "Ubuntu" } else { "ubuntu" };
            thread::spawn(move || {
                barrier.wait();
                installer.begin("Ubuntu", name)
            })
        })
        .collect();

    let mut tickets = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.join().map_err(|_| "begin panicked")? {
            Ok(ticket) => tickets.push(ticket),
            Err(Error::NameConflict { reason, .. }) => {
                assert_eq!(reason, ConflictReason::InProgress);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(tickets.len(), 1);
    assert_eq!(conflicts, callers - 1);
    assert_eq!(installer.active().len(), 1);

    assert!(installer.cancel("Ubuntu"));
    for ticket in tickets {
        assert_eq!(ticket.wait_outcome(), InstallOutcome::Cancelled);
    }
    Ok(())
}

#[test]
fn cancel_yields_cancelled_even_with_nonzero_exit() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.delay("install", "5")?;
    fake.fail("install", 1, "should never be reported")?;
    let (installer, rx) = installer(&fake);

    let ticket = installer.begin("Ubuntu", "Ubuntu")?;
    assert!(wait_for_pid(&installer, "Ubuntu"));

    assert!(installer.cancel("Ubuntu"));
    assert!(installer.cancel("ubuntu"), "cancel is idempotent");

    match ticket.wait() {
        Err(Error::OperationCancelled { name }) => assert_eq!(name, "Ubuntu"),
        other => panic!("unexpected result: {other:?}"),
    }

    let events = events_until(&rx, DEFAULT_TIMEOUT, is_finished);
    assert_eq!(
        events.last(),
        Some(&Event::InstallFinished {
            install_name: "Ubuntu".into(),
            outcome: InstallOutcome::Cancelled,
        })
    );
    assert!(!installer.is_active("Ubuntu"));
    assert!(!installer.cancel("Ubuntu"));
    Ok(())
}

#[test]
fn failed_install_attaches_stderr() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.fail("install", 2, "Error: 0x80370102 virtualization disabled")?;
    let (installer, _rx) = installer(&fake);

    match installer.begin("Ubuntu", "Ubuntu")?.wait() {
        Err(Error::ExecutionFailure { command, detail }) => {
            assert_eq!(command, "wsl.exe --install -d Ubuntu");
            assert!(detail.contains("exit code 2"));
            assert!(detail.contains("virtualization disabled"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn pause_stops_the_child_until_resumed() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.delay("install", "1")?;
    let (installer, _rx) = installer(&fake);

    let ticket = installer.begin("Ubuntu", "Ubuntu")?;
    assert!(wait_for_pid(&installer, "Ubuntu"));

    assert!(installer.pause("Ubuntu")?);
    assert!(!installer.pause("Ubuntu")?, "second pause is a no-op");
    assert!(eventually(DEFAULT_TIMEOUT, || {
        installer
            .active()
            .first()
            .is_some_and(|snapshot| snapshot.observed == Some(ObservedState::Stopped))
    }));

    // Long enough for the unpaused install to have finished.
    thread::sleep(Duration::from_millis(1500));
    let snapshot = installer.active();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].paused);
    assert_eq!(snapshot[0].phase, InstallPhase::Paused);

    assert_eq!(
        installer.toggle_pause("Ubuntu")?,
        Some(InstallPhase::Installing)
    );
    assert!(!installer.resume("Ubuntu")?, "resume when running is a no-op");
    ticket.wait()?;
    Ok(())
}

#[test]
fn cancel_terminates_a_paused_install() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.delay("install", "5")?;
    let (installer, _rx) = installer(&fake);

    let ticket = installer.begin("Ubuntu", "Ubuntu")?;
    assert!(wait_for_pid(&installer, "Ubuntu"));
    assert!(installer.pause("Ubuntu")?);

    assert!(installer.cancel("Ubuntu"));
    assert_eq!(ticket.wait_outcome(), InstallOutcome::Cancelled);
    Ok(())
}

#[test]
fn suggestions_skip_installed_and_active_names() -> TestResult {
    let fake = FakeWsl::new()?;
    fake.respond("quiet", "Ubuntu\r\nubuntu-2\r\n")?;
    fake.delay("install", "3")?;
    let (installer, _rx) = installer(&fake);

    assert_eq!(installer.suggest_install_name("Debian")?, "Debian");
    assert_eq!(installer.suggest_install_name("Ubuntu")?, "Ubuntu-3");
    assert_eq!(
        installer.suggest_install_name("Ubuntu")?,
        "Ubuntu-3",
        "suggestion does not reserve the name"
    );

    let ticket = installer.begin("Ubuntu", "Ubuntu-3")?;
    assert_eq!(installer.suggest_install_name("Ubuntu")?, "Ubuntu-4");

    installer.cancel("Ubuntu-3");
    assert_eq!(ticket.wait_outcome(), InstallOutcome::Cancelled);
    Ok(())
}
