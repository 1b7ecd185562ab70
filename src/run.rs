//! Whole-run entry points.
//!
//! ## Step order
//!
//! ```text
//! acquire workspace
//!   → unpack archives under the input dir
//!   → convert documents in the extracted tree      (P1)
//!   → convert documents in the input tree          (P2)
//!   → sort P1 ++ P2 by path, merge into <input>/<output_name>
//! release workspace
//! ```
//!
//! Item failures never abort a run: they are logged, reported through the
//! progress callback and recorded in the [`RunReport`]. Only a workspace that
//! cannot be created, or a failure of the runtime itself, returns `Err`. The
//! scratch area is removed on every exit path, panics included.

use crate::config::PipelineConfig;
use crate::error::DocMergeError;
use crate::output::{RunOutcome, RunReport};
use crate::pipeline::convert::DocumentConverter;
use crate::pipeline::discover::discover_and_convert;
use crate::pipeline::extract::ArchiveExtractor;
use crate::pipeline::merge::MergeEngine;
use crate::pipeline::unpack::unpack_tree;
use crate::pipeline::RunContext;
use crate::progress::Stage;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// A configured pipeline: the three backend cascades plus the run settings.
///
/// The cascades default to [`ArchiveExtractor::from_config`],
/// [`DocumentConverter::from_config`] and [`MergeEngine::from_config`];
/// replace any of them to plug in other backends.
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    extractor: ArchiveExtractor,
    converter: DocumentConverter,
    merger: MergeEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            extractor: ArchiveExtractor::from_config(&config),
            converter: DocumentConverter::from_config(&config),
            merger: MergeEngine::from_config(&config),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_converter(mut self, converter: DocumentConverter) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_merger(mut self, merger: MergeEngine) -> Self {
        self.merger = merger;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Where a run over `input_dir` writes its merged PDF.
    pub fn output_path(&self, input_dir: &Path) -> PathBuf {
        input_dir.join(&self.config.output_name)
    }

    /// Process `input_dir` end to end.
    pub async fn run(&self, input_dir: &Path) -> Result<RunReport, DocMergeError> {
        let started = Instant::now();
        info!("Processing directory: {}", input_dir.display());

        // ── Step 1: Workspace ───────────────────────────────────────────
        let workspace = Workspace::acquire(&self.config).map_err(|e| {
            error!("{}", e);
            e
        })?;
        let output_file = self.output_path(input_dir);
        let ctx = RunContext::new(&self.config, &workspace).with_output_file(&output_file);

        // ── Step 2: Unpack ──────────────────────────────────────────────
        ctx.progress.on_stage(Stage::Unpacking);
        let unpack = unpack_tree(&ctx, &self.extractor, input_dir).await;

        // ── Step 3: Convert extracted documents ─────────────────────────
        ctx.progress.on_stage(Stage::ConvertingExtracted);
        let extracted_documents =
            discover_and_convert(&ctx, &self.converter, &workspace.extract_root()).await;

        // ── Step 4: Convert input documents ─────────────────────────────
        ctx.progress.on_stage(Stage::ConvertingInput);
        let input_documents = discover_and_convert(&ctx, &self.converter, input_dir).await;

        // ── Step 5: Merge ───────────────────────────────────────────────
        let mut merge_set = extracted_documents.pdf_paths();
        merge_set.extend(input_documents.pdf_paths());
        merge_set.sort();

        let outcome = if merge_set.is_empty() {
            warn!("No documents were converted, nothing to merge");
            RunOutcome::NothingToProcess
        } else {
            ctx.progress.on_stage(Stage::Merging);
            match self.merger.merge(&merge_set, &output_file).await {
                Ok(report) => {
                    ctx.progress.on_merge_complete(
                        &report.output,
                        &report.backend,
                        report.merged.len(),
                        report.skipped.len(),
                    );
                    info!("Merged PDF written to {}", report.output.display());
                    RunOutcome::Merged(report)
                }
                Err(DocMergeError::MergeFailed { attempts, .. }) => {
                    let msg = format!(
                        "Could not merge {} PDF(s) into {}",
                        merge_set.len(),
                        output_file.display()
                    );
                    error!("{}", msg);
                    ctx.progress.on_merge_failed(&msg);
                    RunOutcome::MergeFailed { attempts }
                }
                Err(e) => {
                    ctx.progress.on_merge_failed(&e.to_string());
                    return Err(e);
                }
            }
        };

        // ── Step 6: Cleanup ─────────────────────────────────────────────
        ctx.progress.on_stage(Stage::CleaningUp);
        drop(ctx);
        workspace.release();

        Ok(RunReport {
            input_dir: input_dir.to_path_buf(),
            unpack,
            extracted_documents,
            input_documents,
            merge_set,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Process `input_dir` with the default backend cascades.
pub async fn run(input_dir: &Path, config: &PipelineConfig) -> Result<RunReport, DocMergeError> {
    Pipeline::new(config.clone()).run(input_dir).await
}

/// Synchronous wrapper around [`run`] for callers without a runtime.
pub fn run_sync(input_dir: &Path, config: &PipelineConfig) -> Result<RunReport, DocMergeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocMergeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(input_dir, config))
}
