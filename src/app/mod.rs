pub mod actions;
pub mod common;
pub mod display;
pub mod error;
pub mod install;
pub mod list;
pub mod watch;

pub use actions::{handle_shutdown, handle_start, handle_stop};
pub use install::handle_install;
pub use list::{handle_catalog, handle_list, handle_status};
pub use watch::handle_watch;
