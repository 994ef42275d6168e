use std::process::ExitCode;

use clap::{CommandFactory, Parser, error::ErrorKind};

use wslctl::app::{self, error::exit_code};
use wslctl::cli::{Cli, Commands};

/// Log filter for the binary, e.g. `WSLCTL_LOG=debug`.
const LOG_ENV: &str = "WSLCTL_LOG";

fn main() -> ExitCode {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(64),
            };
        }
    };

    let Cli { config, command } = cli;

    let command = match command {
        Some(cmd) => cmd,
        None => {
            let mut command = Cli::command();
            let _ = command.print_help();
            println!();
            return ExitCode::from(64);
        }
    };

    let config = config.as_ref();
    let exit = match command {
        Commands::List(args) => app::handle_list(args, config),
        Commands::Status(args) => app::handle_status(args, config),
        Commands::Catalog(args) => app::handle_catalog(args, config),
        Commands::Install(args) => app::handle_install(args, config),
        Commands::Start(args) => app::handle_start(args, config),
        Commands::Stop(args) => app::handle_stop(args, config),
        Commands::Shutdown => app::handle_shutdown(config),
        Commands::Watch(args) => app::handle_watch(args, config),
    };

    match exit {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            exit_code(&err)
        }
    }
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "warn"))
        .format_timestamp(None)
        .init();
}
