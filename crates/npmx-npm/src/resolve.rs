//! Locating the npm executable.

use npmx_core::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[cfg(windows)]
pub const NPM_EXECUTABLE: &str = "npm.cmd";
#[cfg(not(windows))]
pub const NPM_EXECUTABLE: &str = "npm";

/// Resolves the npm executable to run.
///
/// A configured path is used as-is when it points at a file, or joined with
/// the executable name when it points at a directory. Otherwise, with
/// `use_fallback` set, `PATH` and the usual Node.js install locations are
/// searched in that order.
pub fn resolve_npm_path(configured: Option<&Path>, use_fallback: bool) -> Result<PathBuf> {
    if let Some(path) = configured.and_then(usable_path) {
        return Ok(path);
    }

    let wanted = configured
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| NPM_EXECUTABLE.to_string());

    if !use_fallback {
        return Err(Error::ToolNotFound(wanted));
    }

    if let Some(path) = configured {
        warn!(
            "Configured npm path {} is not usable, searching for npm",
            path.display()
        );
    }

    let search_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    find_in_dirs(search_path.into_iter().chain(well_known_dirs()))
        .ok_or(Error::ToolNotFound(wanted))
}

fn usable_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.to_path_buf())
    } else if path.is_dir() {
        let candidate = path.join(NPM_EXECUTABLE);
        candidate.is_file().then_some(candidate)
    } else {
        None
    }
}

/// Returns the first directory that contains the npm executable.
pub fn find_in_dirs<I>(dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    dirs.into_iter()
        .map(|dir| dir.join(NPM_EXECUTABLE))
        .find(|candidate| candidate.is_file())
        .inspect(|found| debug!("Found npm at {}", found.display()))
}

#[cfg(windows)]
fn well_known_dirs() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)", "ProgramW6432"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .map(|base| PathBuf::from(base).join("nodejs"))
        .chain(std::env::var_os("APPDATA").map(|base| PathBuf::from(base).join("npm")))
        .collect()
}

#[cfg(not(windows))]
fn well_known_dirs() -> Vec<PathBuf> {
    ["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin"]
        .iter()
        .map(PathBuf::from)
        .collect()
}
