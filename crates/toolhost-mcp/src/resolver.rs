//! Executable resolution for server commands.
//!
//! Turns a configured command such as `npx` into an absolute path before
//! spawning, recording every candidate that was checked so a failed launch
//! can explain itself.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::path::package_manager_dirs;

/// Successful resolution.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    /// Absolute path to the executable.
    pub resolved_path: PathBuf,
    /// Every candidate checked, in order, ending with the winner.
    pub attempts: Vec<Attempt>,
}

/// A single candidate that was checked.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub candidate: PathBuf,
    pub outcome: AttemptOutcome,
}

/// Outcome of checking one candidate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Ok,
    NotFound,
    NotAFile,
    NotExecutable,
    IoError(String),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::NotFound => write!(f, "not found"),
            Self::NotAFile => write!(f, "not a file"),
            Self::NotExecutable => write!(f, "not executable"),
            Self::IoError(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

/// Resolution failed for every candidate.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Could not resolve '{command}' to an executable path. Tried:\n{attempts}")]
    NotResolved { command: String, attempts: String },
}

impl ResolveError {
    fn not_resolved(command: &str, attempts: &[Attempt]) -> Self {
        let attempts_str = attempts
            .iter()
            .map(|a| format!("  ✗ {}: {}", a.candidate.display(), a.outcome))
            .collect::<Vec<_>>()
            .join("\n");

        Self::NotResolved {
            command: command.to_string(),
            attempts: if attempts_str.is_empty() {
                "  (no candidates checked)".to_string()
            } else {
                attempts_str
            },
        }
    }
}

/// Resolve `command` against `search_path` (a PATH-style list).
///
/// Commands containing a path separator are checked as-is. Bare names are
/// looked up in `search_path` first, then in common package-manager
/// locations.
pub fn resolve_executable(
    command: &str,
    search_path: Option<&OsStr>,
) -> Result<ResolveResult, ResolveError> {
    if command.is_empty() {
        return Err(ResolveError::EmptyCommand);
    }

    let command_path = Path::new(command);
    let mut attempts = Vec::new();

    if command_path.components().count() > 1 || command_path.is_absolute() {
        let outcome = check_executable(command_path);
        let ok = outcome == AttemptOutcome::Ok;
        attempts.push(Attempt {
            candidate: command_path.to_path_buf(),
            outcome,
        });
        if ok {
            return Ok(ResolveResult {
                resolved_path: command_path.to_path_buf(),
                attempts,
            });
        }
        return Err(ResolveError::not_resolved(command, &attempts));
    }

    let path_dirs = search_path
        .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
        .unwrap_or_default();
    let home = dirs::home_dir();
    let candidates = path_dirs
        .into_iter()
        .chain(package_manager_dirs(home.as_deref()))
        .filter(|dir| !dir.as_os_str().is_empty());

    for dir in candidates {
        let candidate = dir.join(command);
        if attempts.iter().any(|a: &Attempt| a.candidate == candidate) {
            continue;
        }
        let outcome = check_executable(&candidate);
        let ok = outcome == AttemptOutcome::Ok;
        attempts.push(Attempt {
            candidate: candidate.clone(),
            outcome,
        });
        if ok {
            return Ok(ResolveResult {
                resolved_path: candidate,
                attempts,
            });
        }
    }

    Err(ResolveError::not_resolved(command, &attempts))
}

fn check_executable(path: &Path) -> AttemptOutcome {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AttemptOutcome::NotFound,
        Err(e) => return AttemptOutcome::IoError(e.to_string()),
    };

    if !metadata.is_file() {
        return AttemptOutcome::NotAFile;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return AttemptOutcome::NotExecutable;
        }
    }

    AttemptOutcome::Ok
}
