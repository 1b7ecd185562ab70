//! Input resolution: pick the directory a run processes.
//!
//! A missing or invalid argument is not an error. The run falls back to the
//! current working directory, as a plain `docmerge` with no argument would.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The argument if it names an existing directory, else the working directory.
pub fn resolve_input_dir(arg: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match arg {
        Some(dir) if dir.is_dir() => {
            debug!("Input directory: {}", dir.display());
            dir.to_path_buf()
        }
        Some(other) => {
            warn!(
                "'{}' is not a directory, using the current directory {}",
                other.display(),
                cwd.display()
            );
            cwd
        }
        None => cwd,
    }
}
