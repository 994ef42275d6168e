//! wslctl library crate.

/// Core library modules and APIs.
pub mod core;

/// CLI argument parsing and adapters (only when the `cli` feature is enabled).
#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "cli")]
pub mod app;

pub mod config;
pub mod error;

pub use config::{Config, ConfigSource, TerminalCommand, load_config};
pub use error::{ConflictReason, Error, Result};
