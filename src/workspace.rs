//! Scratch-area lifecycle for one run.
//!
//! A [`Workspace`] owns a unique temporary directory with two fixed
//! sub-directories:
//!
//! ```text
//! $TMP/doc_processor_XXXXXX/
//!  ├─ extracted/   one extract_<name>/ per unpacked archive
//!  └─ pdfs/        staged PDFs awaiting the merge
//! ```
//!
//! Extraction and staging are kept apart so the discovery pass over the
//! extracted tree never walks into PDFs it is producing itself.
//!
//! Release is tied to ownership: [`Workspace::release`] deletes the tree and
//! logs (never raises) a failure, and `Drop` does the same if `release` was
//! never reached, so early returns and panics clean up too.

use crate::config::{PipelineConfig, SCRATCH_PREFIX};
use crate::error::DocMergeError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Isolated scratch area plus the reserved output directory.
#[derive(Debug)]
pub struct Workspace {
    scratch: Option<TempDir>,
    scratch_path: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    /// Create the scratch directory and ensure the output directory exists.
    pub fn acquire(config: &PipelineConfig) -> Result<Self, DocMergeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);

        let scratch = match &config.scratch_parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| DocMergeError::WorkspaceSetup {
                    path: parent.clone(),
                    source: e,
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| DocMergeError::WorkspaceSetup {
            path: config
                .scratch_parent
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            source: e,
        })?;

        let scratch_path = scratch.path().to_path_buf();
        for sub in [EXTRACTED_DIR, STAGING_DIR] {
            let dir = scratch_path.join(sub);
            std::fs::create_dir_all(&dir)
                .map_err(|e| DocMergeError::WorkspaceSetup { path: dir, source: e })?;
        }
        info!("Created scratch directory: {}", scratch_path.display());

        let output_dir = if config.output_dir.is_absolute() {
            config.output_dir.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| DocMergeError::WorkspaceSetup {
                    path: config.output_dir.clone(),
                    source: e,
                })?
                .join(&config.output_dir)
        };
        std::fs::create_dir_all(&output_dir).map_err(|e| DocMergeError::WorkspaceSetup {
            path: output_dir.clone(),
            source: e,
        })?;
        debug!("Output directory ready: {}", output_dir.display());

        Ok(Self {
            scratch: Some(scratch),
            scratch_path,
            output_dir,
        })
    }

    /// Root of the scratch area.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_path
    }

    /// Where archives are unpacked.
    pub fn extract_root(&self) -> PathBuf {
        self.scratch_path.join(EXTRACTED_DIR)
    }

    /// Where converted PDFs are staged.
    pub fn staging_dir(&self) -> PathBuf {
        self.scratch_path.join(STAGING_DIR)
    }

    /// The reserved output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Delete the scratch area. Failures are logged, not returned.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(scratch) = self.scratch.take() else {
            return;
        };
        match scratch.close() {
            Ok(()) => info!("Removed scratch directory: {}", self.scratch_path.display()),
            Err(e) => warn!(
                "Failed to remove scratch directory {}: {}",
                self.scratch_path.display(),
                e
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release_inner();
    }
}

const EXTRACTED_DIR: &str = "extracted";
const STAGING_DIR: &str = "pdfs";

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> PipelineConfig {
        PipelineConfig::builder()
            .scratch_parent(dir.join("tmp"))
            .output_dir(dir.join("output"))
            .build()
            .unwrap()
    }

    #[test]
    fn acquire_creates_layout() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(&config_in(root.path())).unwrap();

        assert!(ws.scratch_dir().is_dir());
        assert!(ws.extract_root().is_dir());
        assert!(ws.staging_dir().is_dir());
        assert!(ws.output_dir().is_dir());
        let name = ws.scratch_dir().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(SCRATCH_PREFIX), "got: {name}");
    }

    #[test]
    fn two_workspaces_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let a = Workspace::acquire(&config).unwrap();
        let b = Workspace::acquire(&config).unwrap();
        assert_ne!(a.scratch_dir(), b.scratch_dir());
        // The output directory is shared and idempotently created.
        assert_eq!(a.output_dir(), b.output_dir());
    }

    #[test]
    fn release_removes_scratch_but_keeps_output() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(&config_in(root.path())).unwrap();
        let scratch = ws.scratch_dir().to_path_buf();
        let output = ws.output_dir().to_path_buf();
        std::fs::write(ws.staging_dir().join("a.pdf"), b"%PDF-1.4").unwrap();

        ws.release();

        assert!(!scratch.exists());
        assert!(output.is_dir());
    }

    #[test]
    fn drop_releases_on_early_exit() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let scratch = {
            let ws = Workspace::acquire(&config).unwrap();
            ws.scratch_dir().to_path_buf()
        };
        assert!(!scratch.exists());
    }

    #[test]
    fn drop_releases_on_panic() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let seen = std::sync::Mutex::new(None);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let ws = Workspace::acquire(&config).unwrap();
            *seen.lock().unwrap() = Some(ws.scratch_dir().to_path_buf());
            panic!("boom");
        }));
        assert!(result.is_err());
        let scratch = seen.lock().unwrap().clone().unwrap();
        assert!(!scratch.exists());
    }
}
