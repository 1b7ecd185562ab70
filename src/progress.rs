//! Progress-callback trait for per-item pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts archives, converts documents and merges
//! the result. The CLI turns these into one status line per event; a library
//! caller can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docmerge::{PipelineProgressCallback, PipelineConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_document_converted(&self, source: &Path, _pdf: &Path, backend: &str) {
//!         self.converted.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} via {}", source.display(), backend);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { converted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The coarse steps of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Unpacking,
    ConvertingExtracted,
    ConvertingInput,
    Merging,
    CleaningUp,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Unpacking => "Unpacking archives",
            Stage::ConvertingExtracted => "Converting extracted documents",
            Stage::ConvertingInput => "Converting input documents",
            Stage::Merging => "Merging PDFs",
            Stage::CleaningUp => "Cleaning up",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as it processes each item.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive strictly in order: the pipeline never
/// runs two items at once.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after an archive was unpacked into `dest`.
    fn on_archive_extracted(&self, archive: &Path, dest: &Path, backend: &str) {
        let _ = (archive, dest, backend);
    }

    /// Called when every extraction backend failed, or the archive was
    /// skipped by the depth guard.
    fn on_archive_failed(&self, archive: &Path, error: &str) {
        let _ = (archive, error);
    }

    /// Called after a document produced a PDF.
    fn on_document_converted(&self, source: &Path, pdf: &Path, backend: &str) {
        let _ = (source, pdf, backend);
    }

    /// Called when a document could not be converted.
    fn on_document_failed(&self, source: &Path, error: &str) {
        let _ = (source, error);
    }

    /// Called once the merged file is in place.
    ///
    /// * `merged`  — inputs that contributed pages
    /// * `skipped` — inputs the successful backend could not add
    fn on_merge_complete(&self, output: &Path, backend: &str, merged: usize, skipped: usize) {
        let _ = (output, backend, merged, skipped);
    }

    /// Called when every merge backend failed.
    fn on_merge_failed(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
