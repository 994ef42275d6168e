use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::Result;
use crate::cli::WatchArgs;
use crate::core::{Event, Reporter, Severity, StatusCache};

use super::common::{ConsoleReporter, Session};

pub fn handle_watch(args: WatchArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let session = Session::open(config_override)?;
    let registry = session.registry();
    let reporter = ConsoleReporter::new();
    let interval = Duration::from_secs(args.interval);
    let mut cache = StatusCache::new();
    let mut polls = 0u64;

    loop {
        match registry.refresh_statuses(&mut cache, &reporter) {
            Ok(changes) => debug!("poll {polls}: {changes} change(s)"),
            Err(err) => reporter.report(Event::Message {
                severity: Severity::Warning,
                text: format!("status poll failed: {err}"),
            }),
        }
        polls += 1;
        if args.count.is_some_and(|count| polls >= count) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}
