use std::env;
use std::process::Command;

/// Overrides the detected revision, e.g. for builds from a source archive.
const REVISION_ENV: &str = "WSLCTL_BUILD_REVISION";

fn main() {
    println!("cargo:rerun-if-env-changed={REVISION_ENV}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let revision = env::var(REVISION_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(describe_worktree);

    let full = match revision {
        Some(revision) => format!("{version} ({})", revision.trim()),
        None => version,
    };
    println!("cargo:rustc-env=WSLCTL_VERSION={full}");
}

/// Abbreviated commit of the checkout, suffixed `-dirty` when it has local edits.
fn describe_worktree() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    (!described.is_empty()).then(|| described.to_string())
}
