use std::path::PathBuf;

use crate::Result;
use crate::cli::{StartArgs, StopArgs};

use super::common::{ConsoleReporter, Session};

pub fn handle_start(args: StartArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let session = Session::open(config_override)?;
    let actions = session.actions();

    if args.terminal {
        let pid = actions.open_terminal(&args.name)?;
        println!("Opened a terminal for `{}` (pid {pid}).", args.name.trim());
    } else if args.direct {
        let pid = actions.launch_direct(&args.name)?;
        println!("Launched `{}` in a new console (pid {pid}).", args.name.trim());
    } else {
        let reporter = ConsoleReporter::new();
        actions.start_background(&args.name, Some(&reporter))?;
    }
    Ok(())
}

pub fn handle_stop(args: StopArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let session = Session::open(config_override)?;
    let reporter = ConsoleReporter::new();
    session.actions().terminate(&args.name, Some(&reporter))
}

pub fn handle_shutdown(config_override: Option<&PathBuf>) -> Result<()> {
    let session = Session::open(config_override)?;
    session.actions().shutdown_all()?;
    println!("All distributions stopped.");
    Ok(())
}
