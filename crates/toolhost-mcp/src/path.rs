//! PATH and environment construction for server processes.
//!
//! Desktop launchers and service managers often start us with a minimal
//! PATH, so `npx`, `uvx` and friends would not be found by the child (or by
//! the scripts it runs). The child PATH is therefore rebuilt from:
//! 1. Directory containing the resolved executable
//! 2. Current process PATH
//! 3. Common package-manager install locations
//!
//! Entries are deduplicated, first occurrence wins.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use toolhost_core::ServerConfig;

/// Platform-specific PATH separator
#[cfg(unix)]
pub const PATH_SEPARATOR: char = ':';
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';

/// Transport hints set for every child unless the config overrides them.
const TRANSPORT_HINTS: &[(&str, &str)] = &[("PYTHONUNBUFFERED", "1"), ("MCP_TRANSPORT", "stdio")];

/// Package-manager bin directories relative to `$HOME`.
const HOME_BIN_DIRS: &[&str] = &[
    ".local/bin",
    ".cargo/bin",
    ".bun/bin",
    ".volta/bin",
    ".deno/bin",
];

/// System-wide locations that are frequently missing from a launcher PATH.
#[cfg(unix)]
const SYSTEM_BIN_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin", "/bin"];
#[cfg(windows)]
const SYSTEM_BIN_DIRS: &[&str] = &[];

/// Common package-manager install locations, in search order.
pub fn package_manager_dirs(home: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = SYSTEM_BIN_DIRS.iter().map(PathBuf::from).collect();
    if let Some(home) = home {
        dirs.extend(HOME_BIN_DIRS.iter().map(|rel| home.join(rel)));
    }
    dirs
}

/// Build the PATH handed to a child process.
pub fn build_effective_path(
    exe_path: Option<&Path>,
    current_path: Option<&OsStr>,
    home: Option<&Path>,
) -> OsString {
    let mut entries: Vec<PathBuf> = Vec::new();

    if let Some(exe_dir) = exe_path.and_then(Path::parent) {
        if !exe_dir.as_os_str().is_empty() {
            entries.push(exe_dir.to_path_buf());
        }
    }

    if let Some(current) = current_path {
        entries.extend(std::env::split_paths(current).filter(|p| !p.as_os_str().is_empty()));
    }

    entries.extend(package_manager_dirs(home));

    let mut seen = HashSet::new();
    let mut joined = OsString::new();
    for entry in entries.into_iter().filter(|e| seen.insert(e.clone())) {
        if !joined.is_empty() {
            joined.push(PATH_SEPARATOR.to_string());
        }
        joined.push(entry.as_os_str());
    }
    joined
}

/// Environment overrides for a child process.
///
/// The child inherits the current environment; these pairs are applied on
/// top. Order: transport hints, then `config.env`, then PATH. A PATH given in
/// `config.env` is prepended to the computed one rather than replacing it.
pub fn child_env_overrides(config: &ServerConfig, exe_path: &Path) -> Vec<(OsString, OsString)> {
    let mut overrides: Vec<(OsString, OsString)> = Vec::new();

    for (key, value) in TRANSPORT_HINTS {
        let overridden = config.env_vars().any(|(k, _)| k == *key);
        if !overridden {
            overrides.push(((*key).into(), (*value).into()));
        }
    }

    let mut config_path = None;
    for (key, value) in config.env_vars() {
        if key == "PATH" {
            config_path = Some(value);
        } else {
            overrides.push((key.into(), value.into()));
        }
    }

    let home = dirs::home_dir();
    let computed = build_effective_path(
        Some(exe_path),
        std::env::var_os("PATH").as_deref(),
        home.as_deref(),
    );
    let path = match config_path {
        Some(extra) if !extra.is_empty() => {
            let mut combined = OsString::from(extra);
            combined.push(PATH_SEPARATOR.to_string());
            combined.push(&computed);
            combined
        }
        _ => computed,
    };
    overrides.push(("PATH".into(), path));

    overrides
}
