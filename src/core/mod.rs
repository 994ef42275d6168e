//! Distribution management library API surface.

pub mod actions;
pub mod control;
pub mod distro;
pub mod events;
pub mod install;
pub mod parse;
pub mod process;
pub mod registry;
pub mod reporter;

pub use actions::Actions;
pub use control::{CapturedOutput, ControlProgram, HostLayout};
pub use distro::{
    CatalogAvailability, CatalogEntry, Distribution, InstalledList, RunState, RunStatus,
    VerboseRow, validate_name,
};
pub use events::{Event, InstallOutcome, InstallPhase, Severity};
pub use install::{InstallSnapshot, InstallTicket, Installer, resolve_install_name};
pub use process::{ChildProcess, ObservedState};
pub use registry::{Registry, StatusCache};
pub use reporter::Reporter;
