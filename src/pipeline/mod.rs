//! Pipeline stages for unpack-convert-merge.
//!
//! Each submodule implements exactly one step. The drivers (`unpack`,
//! `discover`) walk directories and record what happened; the components
//! they call (`extract`, `convert`, `merge`) each run an ordered cascade of
//! backends and stop at the first one that succeeds.
//!
//! ## Data Flow
//!
//! ```text
//! input dir ──▶ unpack ──▶ discover ×2 ──▶ sort ──▶ merge
//!               (extract)   (convert)               (lopdf/qpdf/pdfium)
//! ```
//!
//! 1. [`input`]    — pick the directory to process
//! 2. [`unpack`]   — flatten nested archives into the scratch area
//! 3. [`discover`] — stage one PDF per document, first for the extracted
//!    tree, then for the input tree
//! 4. [`merge`]    — concatenate the sorted staged PDFs into the output
//!
//! [`process`] is the shared runner for every external tool.

pub mod convert;
pub mod discover;
pub mod extract;
pub mod input;
pub mod merge;
pub mod process;
pub mod unpack;

use crate::config::PipelineConfig;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a driver needs for one run, passed explicitly.
pub struct RunContext<'a> {
    pub config: &'a PipelineConfig,
    pub workspace: &'a Workspace,
    pub progress: ProgressCallback,
    /// This run's output file; never picked up as an input document.
    pub output_file: Option<PathBuf>,
}

impl<'a> RunContext<'a> {
    pub fn new(config: &'a PipelineConfig, workspace: &'a Workspace) -> Self {
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            config,
            workspace,
            progress,
            output_file: None,
        }
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }
}
