//! Error types for the edgequake-docmerge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocMergeError`] — returned across a component boundary. Most variants
//!   describe one item (an archive, a document, the merge) that could not be
//!   processed; the drivers log them and move on. Only [`DocMergeError::WorkspaceSetup`]
//!   and [`DocMergeError::Internal`] stop a whole run.
//!
//! * [`BackendError`] — the reason one backend attempt failed. A cascade
//!   collects one [`Attempt`] per backend it tried, so a final failure can say
//!   exactly what was tried and why each step gave up.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the edgequake-docmerge library.
#[derive(Debug, Error)]
pub enum DocMergeError {
    // ── Run-level errors ──────────────────────────────────────────────────
    /// The scratch area or output directory could not be created.
    #[error("Failed to prepare workspace at '{path}': {source}")]
    WorkspaceSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Item-level errors ─────────────────────────────────────────────────
    /// The file name does not carry a recognised archive suffix.
    #[error("Not a recognised archive: '{path}'")]
    NotAnArchive { path: PathBuf },

    /// Every extraction backend failed for this archive.
    #[error("Failed to extract '{path}': {}", Attempt::join(.attempts))]
    ExtractionFailed {
        path: PathBuf,
        attempts: Vec<Attempt>,
    },

    /// The document extension is not one we can convert.
    #[error("Unsupported document format: '{path}'")]
    UnsupportedDocument { path: PathBuf },

    /// Every conversion backend failed for this document.
    #[error("Failed to convert '{path}': {}", Attempt::join(.attempts))]
    ConversionFailed {
        path: PathBuf,
        attempts: Vec<Attempt>,
    },

    // ── Merge errors ──────────────────────────────────────────────────────
    /// `merge` was called with an empty input list.
    #[error("No PDF files to merge")]
    NoInput,

    /// Every merge backend failed; no output file was written.
    #[error("All merge backends failed for '{output}': {}", Attempt::join(.attempts))]
    MergeFailed {
        output: PathBuf,
        attempts: Vec<Attempt>,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single backend attempt failed.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot run here: missing program, missing library,
    /// unsupported platform.
    #[error("{backend} is not available: {reason}")]
    Unavailable { backend: String, reason: String },

    /// The backend does not handle this kind of input.
    #[error("{backend} does not handle {what}")]
    Unsupported { backend: String, what: String },

    /// An external program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// An external program exceeded the configured timeout and was killed.
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// The backend reported success but the expected file is not there.
    #[error("{backend} reported success but '{path}' does not exist")]
    MissingOutput { backend: String, path: PathBuf },

    /// A merge backend could not add a single one of its inputs.
    #[error("{backend} could not add any of the {total} input files")]
    NothingMerged { backend: String, total: usize },

    /// Library-level failure inside the backend.
    #[error("{backend}: {detail}")]
    Failed { backend: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn failed(backend: &str, detail: impl fmt::Display) -> Self {
        BackendError::Failed {
            backend: backend.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn unsupported(backend: &str, what: impl fmt::Display) -> Self {
        BackendError::Unsupported {
            backend: backend.to_string(),
            what: what.to_string(),
        }
    }

    /// `true` when the failure says nothing about the input itself, only
    /// that the backend could not be used.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable { .. } | BackendError::Unsupported { .. }
        )
    }
}

/// One tried backend and the reason it gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub backend: String,
    pub error: String,
}

impl Attempt {
    pub fn new(backend: &str, error: &BackendError) -> Self {
        Self {
            backend: backend.to_string(),
            error: error.to_string(),
        }
    }

    fn join(attempts: &[Attempt]) -> String {
        if attempts.is_empty() {
            return "no backend available".to_string();
        }
        attempts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.backend, self.error)
    }
}
