//! Result types produced by each stage and by a whole run.
//!
//! Every report is `Serialize` so the CLI can print it with `--json` and a
//! library caller can persist it. Failures are kept as data next to the
//! successes; a run that converted nine of ten documents reports both.

use crate::error::Attempt;
use crate::kind::DocumentKind;
use serde::Serialize;
use std::path::PathBuf;

/// One archive that was unpacked.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedArchive {
    pub archive: PathBuf,
    pub destination: PathBuf,
    pub backend: String,
    /// Nesting level; archives found directly in the input tree are 1.
    pub depth: usize,
}

/// An archive or document that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`crate::pipeline::unpack::unpack_tree`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnpackReport {
    pub extracted: Vec<ExtractedArchive>,
    pub failed: Vec<ItemFailure>,
    /// Archives left alone because they sit deeper than the depth limit.
    pub depth_limited: Vec<PathBuf>,
}

impl UnpackReport {
    /// Number of archives discovered, whatever happened to them.
    pub fn archives_seen(&self) -> usize {
        self.extracted.len() + self.failed.len() + self.depth_limited.len()
    }
}

/// One successfully converted document.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub source: PathBuf,
    pub output_pdf: PathBuf,
    pub kind: DocumentKind,
    pub backend: String,
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    /// Successful conversions, in walk order.
    pub converted: Vec<ConversionResult>,
    pub failed: Vec<ItemFailure>,
}

impl DiscoveryReport {
    /// Produced PDF paths, in walk order.
    pub fn pdf_paths(&self) -> Vec<PathBuf> {
        self.converted.iter().map(|c| c.output_pdf.clone()).collect()
    }
}

/// Outcome of a successful merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    /// Name of the backend whose output survived.
    pub backend: String,
    /// Inputs that contributed pages, in merge order.
    pub merged: Vec<PathBuf>,
    /// Inputs the successful backend could not add.
    pub skipped: Vec<ItemFailure>,
    /// Earlier backends that failed before this one succeeded.
    pub failed_backends: Vec<Attempt>,
    pub page_count: Option<usize>,
}

/// What a run ended with.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Merged(MergeReport),
    /// No document anywhere produced a PDF. Not an error.
    NothingToProcess,
    MergeFailed { attempts: Vec<Attempt> },
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input_dir: PathBuf,
    pub unpack: UnpackReport,
    pub extracted_documents: DiscoveryReport,
    pub input_documents: DiscoveryReport,
    /// The sorted merge input.
    pub merge_set: Vec<PathBuf>,
    pub outcome: RunOutcome,
    pub duration_ms: u64,
}

impl RunReport {
    /// Path of the merged PDF when the run produced one.
    pub fn output_path(&self) -> Option<&PathBuf> {
        match &self.outcome {
            RunOutcome::Merged(m) => Some(&m.output),
            _ => None,
        }
    }

    /// Total documents that failed to convert in either pass.
    pub fn conversion_failures(&self) -> usize {
        self.extracted_documents.failed.len() + self.input_documents.failed.len()
    }

    /// `true` when something was skipped anywhere along the way.
    pub fn has_partial_failures(&self) -> bool {
        let merge_skips = match &self.outcome {
            RunOutcome::Merged(m) => !m.skipped.is_empty(),
            RunOutcome::MergeFailed { .. } => true,
            RunOutcome::NothingToProcess => false,
        };
        !self.unpack.failed.is_empty()
            || !self.unpack.depth_limited.is_empty()
            || self.conversion_failures() > 0
            || merge_skips
    }
}
