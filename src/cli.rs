use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

const VERSION: &str = env!("WSLCTL_VERSION");

/// Top-level CLI definition for the `wslctl` tool.
#[derive(Debug, Parser)]
#[command(
    name = "wslctl",
    version = VERSION,
    about = "Inspect, install, start, and stop WSL distributions.",
    long_about = "wslctl drives the wsl.exe control program: it lists installed and online \
                  distributions, runs installs in the background with pause and cancel, and \
                  starts or stops individual distributions."
)]
pub struct Cli {
    /// Path to an explicit configuration file.
    #[arg(
        global = true,
        short,
        long = "config",
        value_name = "PATH",
        help = "Load configuration from PATH instead of $WSLCTL_CONFIG or the per-user default"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show installed distributions with their run state.
    List(ListArgs),
    /// Print the run state of one distribution.
    Status(StatusArgs),
    /// Show distributions available from the online catalog.
    Catalog(CatalogArgs),
    /// Install a catalog distribution, optionally under a different name.
    Install(InstallArgs),
    /// Start a distribution in the background, a new console, or a terminal window.
    Start(StartArgs),
    /// Terminate a running distribution.
    Stop(StopArgs),
    /// Stop every distribution and the WSL virtual machine.
    Shutdown,
    /// Poll installed distributions and print state changes as they happen.
    Watch(WatchArgs),
}

#[derive(Debug, Args, Default)]
pub struct ListArgs {
    /// Emit JSON instead of a table.
    #[arg(long, help = "Emit machine-readable JSON")]
    pub json: bool,

    /// Query the online catalog for friendly names and descriptions.
    #[arg(long, help = "Look up friendly names and descriptions in the online catalog")]
    pub online: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Distribution name (case-insensitive).
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args, Default)]
pub struct CatalogArgs {
    #[arg(long, help = "Emit machine-readable JSON")]
    pub json: bool,

    /// Include entries that are already installed.
    #[arg(long, help = "Also list catalog entries that are already installed")]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Catalog name to install, e.g. `Ubuntu`.
    #[arg(value_name = "CATALOG_NAME")]
    pub catalog_name: String,

    /// Register the distribution under NAME instead of a suggested free name.
    #[arg(
        long,
        value_name = "NAME",
        help = "Install under NAME; defaults to the catalog name or the first free `-N` suffix"
    )]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("mode").args(["direct", "terminal"])))]
pub struct StartArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Run the default shell in a new console instead of booting in the background.
    #[arg(long, help = "Launch the distribution's shell in a new console")]
    pub direct: bool,

    /// Open a terminal window that stays open after the shell exits.
    #[arg(long, help = "Open the distribution in a persistent terminal window")]
    pub terminal: bool,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between polls.
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 2,
        value_parser = clap::value_parser!(u64).range(1..=3600),
        help = "Poll every SECONDS seconds"
    )]
    pub interval: u64,

    /// Stop after this many polls.
    #[arg(long, value_name = "N", help = "Exit after N polls instead of running until interrupted")]
    pub count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_modes_are_mutually_exclusive() {
        let err = Cli::try_parse_from(["wslctl", "start", "Ubuntu", "--direct", "--terminal"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn install_accepts_optional_name() {
        let cli = Cli::try_parse_from(["wslctl", "install", "Ubuntu", "--name", "Ubuntu-2"])
            .expect("parse");
        match cli.command {
            Some(Commands::Install(args)) => {
                assert_eq!(args.catalog_name, "Ubuntu");
                assert_eq!(args.name.as_deref(), Some("Ubuntu-2"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn version_leads_with_package_version() {
        assert!(VERSION.starts_with(env!("CARGO_PKG_VERSION")));
        let rendered = Cli::command().render_version();
        assert!(rendered.contains(VERSION));
    }

    #[test]
    fn global_config_flag_follows_subcommand() {
        let cli = Cli::try_parse_from(["wslctl", "list", "--config", "alt.toml"]).expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
    }
}
