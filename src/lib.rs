//! # edgequake-docmerge
//!
//! Turn a directory of archives and office documents into one PDF.
//!
//! ## Why this crate?
//!
//! Document bundles arrive as a mess: a zip holding a rar holding a folder of
//! `.docx`, `.pptx` and `.xlsx` files, next to a few loose PDFs. Printing or
//! archiving them means unpacking every layer, converting every document and
//! concatenating the results by hand. This crate does all three, and keeps
//! going when one archive is corrupt or one converter is missing: every
//! stage tries a chain of backends, and a failed item is reported rather
//! than fatal.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Unpack    nested zip / rar / 7z / tar / gz / bz2 / xz → scratch area
//!  ├─ 2. Convert   doc(x) / ppt(x) / xls(x) / pdf → staged PDFs
//!  │               (extracted tree first, then the input tree)
//!  ├─ 3. Merge     staged PDFs, sorted by name → <input>/合并文档.pdf
//!  └─ 4. Cleanup   scratch area removed on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docmerge::{run, PipelineConfig, RunOutcome};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let report = run(Path::new("bundle"), &config).await?;
//!     match &report.outcome {
//!         RunOutcome::Merged(m) => println!("wrote {}", m.output.display()),
//!         RunOutcome::NothingToProcess => println!("nothing to process"),
//!         RunOutcome::MergeFailed { attempts } => eprintln!("merge failed: {attempts:?}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External Tools
//!
//! | Stage | Native | Falls back to |
//! |-------|--------|---------------|
//! | Unpack | zip, tar, gzip | `unzip`, `7z`, `unrar`, `unar`, `bsdtar`, `tar`, `bzip2`, `xz` |
//! | Convert | pdf (copy) | `docx2pdf`; PowerPoint/Excel (Windows); `soffice` |
//! | Merge | lopdf | `qpdf`; pdfium |
//!
//! Missing tools are skipped; a document with no working converter is
//! reported and left out of the merge.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docmerge` binary (clap + anyhow + tracing-subscriber + indicatif + serde_json) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docmerge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod kind;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_OUTPUT_NAME};
pub use error::{Attempt, BackendError, DocMergeError};
pub use kind::{ArchiveFormat, DocumentKind};
pub use output::{
    ConversionResult, DiscoveryReport, ExtractedArchive, ItemFailure, MergeReport, RunOutcome,
    RunReport, UnpackReport,
};
pub use pipeline::convert::{ConvertBackend, DocumentConverter};
pub use pipeline::extract::{ArchiveExtractor, ExtractBackend};
pub use pipeline::input::resolve_input_dir;
pub use pipeline::merge::{MergeBackend, MergeEngine, MergedPages};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use run::{run, run_sync, Pipeline};
pub use workspace::Workspace;
