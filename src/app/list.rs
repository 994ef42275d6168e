use std::io::{self, IsTerminal};
use std::path::PathBuf;

use serde::Serialize;

use crate::cli::{CatalogArgs, ListArgs, StatusArgs};
use crate::core::{CatalogAvailability, Distribution, validate_name};
use crate::{Error, Result};

use super::common::Session;
use super::display::{colorize, column_width, padded, state_color};

pub fn handle_list(args: ListArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let session = Session::open(config_override)?;
    let registry = session.registry();
    let mut distros = registry.distributions()?;

    if args.online && !distros.is_empty() {
        let catalog = registry.list_catalog();
        for distro in &mut distros {
            distro.enrich_from_catalog(&catalog);
        }
    }

    if args.json {
        return print_json(&distros);
    }
    print_distro_table(&distros, args.online);
    Ok(())
}

pub fn handle_status(args: StatusArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let name = validate_name(&args.name)?;
    let session = Session::open(config_override)?;
    let status = session.registry().status(name);

    let use_color = io::stdout().is_terminal();
    let state = colorize(status.state.as_str(), state_color(status.state), use_color);
    match &status.detail {
        Some(detail) => println!("{name}: {state} ({detail})"),
        None => println!("{name}: {state}"),
    }
    Ok(())
}

pub fn handle_catalog(args: CatalogArgs, config_override: Option<&PathBuf>) -> Result<()> {
    let session = Session::open(config_override)?;
    let entries: Vec<CatalogAvailability> = session
        .registry()
        .catalog_with_installed()
        .into_iter()
        .filter(|entry| args.all || !entry.installed)
        .collect();

    if args.json {
        return print_json(&entries);
    }
    print_catalog_table(&entries, args.all);
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|source| Error::RenderJson { source })?;
    println!("{rendered}");
    Ok(())
}

fn print_distro_table(distros: &[Distribution], with_descriptions: bool) {
    if distros.is_empty() {
        println!("No distributions installed. Run `wslctl catalog` to see what is available.");
        return;
    }

    let use_color = io::stdout().is_terminal();
    let name_width = column_width("NAME", distros.iter().map(|d| d.name.as_str()));
    let state_width = column_width("STATE", distros.iter().map(|d| d.state.as_str()));

    println!(
        "  {:<name_width$}  {:<state_width$}  {}",
        "NAME",
        "STATE",
        if with_descriptions { "DESCRIPTION" } else { "DETAIL" }
    );
    for distro in distros {
        let marker = if distro.is_default { '*' } else { ' ' };
        let state = padded(
            distro.state.as_str(),
            state_width,
            state_color(distro.state),
            use_color,
        );
        let trailing = if with_descriptions {
            distro.description.as_str()
        } else {
            distro.detail.as_deref().unwrap_or("")
        };
        println!(
            "{marker} {:<name_width$}  {state}  {trailing}",
            distro.name
        );
    }
}

fn print_catalog_table(entries: &[CatalogAvailability], show_installed: bool) {
    if entries.is_empty() {
        println!("No catalog entries to show. The online catalog may be unreachable.");
        return;
    }

    let name_width = column_width("NAME", entries.iter().map(|e| e.entry.name.as_str()));
    let friendly_width = column_width(
        "FRIENDLY NAME",
        entries.iter().map(|e| e.entry.friendly_name.as_str()),
    );

    if show_installed {
        println!(
            "{:<name_width$}  {:<friendly_width$}  INSTALLED",
            "NAME", "FRIENDLY NAME"
        );
    } else {
        println!("{:<name_width$}  FRIENDLY NAME", "NAME");
    }
    for availability in entries {
        let entry = &availability.entry;
        if show_installed {
            let installed = if availability.installed { "yes" } else { "no" };
            println!(
                "{:<name_width$}  {:<friendly_width$}  {installed}",
                entry.name, entry.friendly_name
            );
        } else {
            println!("{:<name_width$}  {}", entry.name, entry.friendly_name);
        }
    }
}
