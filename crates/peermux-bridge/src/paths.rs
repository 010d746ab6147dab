//! Filesystem path probing for category path warnings.

use std::fs::{self, OpenOptions};
use std::path::Path;

/// Name of the throwaway file used to prove writability.
const WRITE_PROBE: &str = ".peermux-write-probe";

/// Outcome of probing one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Directory exists and is readable and writable.
    Ok,
    /// Path does not exist or is not a directory.
    Missing,
    /// Directory exists but listing it failed.
    NotReadable,
    /// Directory exists but creating a file inside it failed.
    NotWritable,
}

impl ProbeResult {
    /// Whether the probe found a usable directory.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Human-readable detail for warning messages.
    #[must_use]
    pub const fn detail(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Missing => "path does not exist",
            Self::NotReadable => "path is not readable",
            Self::NotWritable => "path is not writable",
        }
    }
}

/// Probe a directory for existence, readability, and writability from the
/// bridge's filesystem view.
#[must_use]
pub fn probe_dir(path: &Path) -> ProbeResult {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) | Err(_) => return ProbeResult::Missing,
    }

    if fs::read_dir(path).is_err() {
        return ProbeResult::NotReadable;
    }

    let probe = path.join(WRITE_PROBE);
    match OpenOptions::new().write(true).create(true).truncate(true).open(&probe) {
        Ok(file) => {
            drop(file);
            let _ = fs::remove_file(&probe);
            ProbeResult::Ok
        }
        Err(_) => ProbeResult::NotWritable,
    }
}

/// Whether the bridge appears to run inside a container.
#[must_use]
pub fn running_in_container() -> bool {
    Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists()
}

/// Hint appended to path warnings inside containers.
pub const CONTAINER_HINT: &str =
    "the bridge runs in a container; verify the volume mounts expose this path";
