use std::collections::BTreeMap;

use log::{debug, warn};

use crate::error::Result;

use super::control::ControlProgram;
use super::distro::{
    CatalogAvailability, CatalogEntry, Distribution, InstalledList, RunState, RunStatus,
    VerboseRow,
};
use super::events::Event;
use super::parse;
use super::reporter::Reporter;

pub const QUIET_LIST_ARGS: [&str; 2] = ["-l", "-q"];
pub const VERBOSE_LIST_ARGS: [&str; 2] = ["-l", "-v"];
pub const ONLINE_LIST_ARGS: [&str; 2] = ["--list", "--online"];

/// Queries answering "what exists" and "what state is it in".
///
/// Every call spawns one short-lived control program run; nothing is cached
/// between calls.
#[derive(Debug, Clone)]
pub struct Registry {
    control: ControlProgram,
}

impl Registry {
    pub fn new(control: ControlProgram) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &ControlProgram {
        &self.control
    }

    pub fn list_installed(&self) -> Result<InstalledList> {
        let stdout = self.control.run_checked(&QUIET_LIST_ARGS)?;
        Ok(parse::parse_quiet_list(&stdout))
    }

    /// All rows of the verbose listing.
    pub fn statuses(&self) -> Result<Vec<VerboseRow>> {
        let stdout = self.control.run_checked(&VERBOSE_LIST_ARGS)?;
        Ok(parse::parse_verbose_list(&stdout))
    }

    /// Current run state of `name`. Never fails; problems surface as `Unknown` with detail.
    pub fn status(&self, name: &str) -> RunStatus {
        let name = name.trim();
        let captured = match self.control.run(&VERBOSE_LIST_ARGS) {
            Ok(captured) => captured,
            Err(err) => {
                debug!("status query for `{name}` could not run: {err}");
                return RunStatus::unknown(err.to_string());
            }
        };

        if !captured.status.success() {
            return RunStatus::unknown(captured.failure_detail());
        }

        parse::parse_verbose_list(&captured.stdout)
            .into_iter()
            .find(|row| row.name.eq_ignore_ascii_case(name))
            .map(|row| row.status())
            .unwrap_or_else(|| RunStatus::unknown("not found"))
    }

    /// Entries available from the online catalog. Empty when the catalog cannot be reached.
    pub fn list_catalog(&self) -> Vec<CatalogEntry> {
        match self.control.run_checked(&ONLINE_LIST_ARGS) {
            Ok(stdout) => parse::parse_catalog(&stdout),
            Err(err) => {
                warn!("online catalog unavailable: {err}");
                Vec::new()
            }
        }
    }

    /// Catalog entries flagged with whether they are currently installed.
    pub fn catalog_with_installed(&self) -> Vec<CatalogAvailability> {
        let catalog = self.list_catalog();
        if catalog.is_empty() {
            return Vec::new();
        }
        let installed = self.list_installed().unwrap_or_else(|err| {
            warn!("installed listing unavailable, assuming nothing is installed: {err}");
            InstalledList::default()
        });
        join_installed(catalog, &installed)
    }

    /// Installed distributions with their current run state, in listing order.
    pub fn distributions(&self) -> Result<Vec<Distribution>> {
        let installed = self.list_installed()?;
        let rows = self.statuses().map_err(|err| {
            warn!("verbose listing failed, run states unknown: {err}");
            err.to_string()
        });

        Ok(installed
            .iter()
            .map(|name| {
                let status = match &rows {
                    Ok(rows) => rows
                        .iter()
                        .find(|row| row.name.eq_ignore_ascii_case(name))
                        .map(VerboseRow::status)
                        .unwrap_or_else(|| RunStatus::unknown("not found")),
                    Err(detail) => RunStatus::unknown(detail.clone()),
                };
                Distribution::installed(name, installed.is_default(name), status)
            })
            .collect())
    }

    /// Re-query and report every difference from the caller-owned `cache`.
    ///
    /// Returns the number of events emitted. On failure the cache is left untouched.
    pub fn refresh_statuses(
        &self,
        cache: &mut StatusCache,
        reporter: &dyn Reporter,
    ) -> Result<usize> {
        let distros = self.distributions()?;
        let events = cache.apply(&distros);
        let count = events.len();
        for event in events {
            reporter.report(event);
        }
        Ok(count)
    }
}

pub(crate) fn join_installed(
    catalog: Vec<CatalogEntry>,
    installed: &InstalledList,
) -> Vec<CatalogAvailability> {
    catalog
        .into_iter()
        .map(|entry| CatalogAvailability {
            installed: installed.contains(&entry.name),
            entry,
        })
        .collect()
}

/// Last run states seen by an observer, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    known: BTreeMap<String, (String, RunState)>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<RunState> {
        self.known.get(&name.to_lowercase()).map(|(_, state)| *state)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Replace the cached view with `distros`, returning the change events.
    pub fn apply(&mut self, distros: &[Distribution]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut next = BTreeMap::new();

        for distro in distros {
            let key = distro.name.to_lowercase();
            let previous = self.known.get(&key).map(|(_, state)| *state);
            if previous != Some(distro.state) {
                events.push(Event::StatusChanged {
                    distro: distro.name.clone(),
                    state: distro.state,
                    previous,
                    detail: distro.detail.clone(),
                });
            }
            next.insert(key, (distro.name.clone(), distro.state));
        }

        for (key, (name, _)) in &self.known {
            if !next.contains_key(key) {
                events.push(Event::DistroRemoved {
                    distro: name.clone(),
                });
            }
        }

        self.known = next;
        events
    }
}
