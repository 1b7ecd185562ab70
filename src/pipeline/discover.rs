//! Document discovery: find every convertible document under a directory and
//! stage a PDF for each one.
//!
//! The walk is file-name-sorted so runs are reproducible, and the full
//! document list is collected before the first conversion starts. Staged
//! PDFs go to the workspace staging directory under `<stem>.pdf`; when that
//! name is already taken (`report.docx` next to `report.pdf`) the next free
//! `<stem> (N).pdf` is used instead, so no staged PDF is ever overwritten.

use crate::kind::is_document;
use crate::output::{DiscoveryReport, ItemFailure};
use crate::pipeline::convert::DocumentConverter;
use crate::pipeline::RunContext;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Convert every document under `root` into the staging directory.
pub async fn discover_and_convert(
    ctx: &RunContext<'_>,
    converter: &DocumentConverter,
    root: &Path,
) -> DiscoveryReport {
    let staging = ctx.workspace.staging_dir();
    let documents = collect_documents(
        root,
        ctx.output_file.as_deref(),
        Some(ctx.workspace.scratch_dir()),
    );
    info!(
        "Found {} document(s) under {}",
        documents.len(),
        root.display()
    );

    let mut report = DiscoveryReport::default();
    for doc in documents {
        let target = staging_target(&staging, &doc);
        match converter.convert_to(&doc, &target).await {
            Ok(result) => {
                ctx.progress
                    .on_document_converted(&doc, &result.output_pdf, &result.backend);
                report.converted.push(result);
            }
            Err(e) => {
                warn!("{}", e);
                ctx.progress.on_document_failed(&doc, &e.to_string());
                report.failed.push(ItemFailure {
                    path: doc,
                    error: e.to_string(),
                });
            }
        }
    }
    report
}

/// Documents under `root` in sorted walk order, minus the file `exclude`
/// and anything inside `skip_dir`.
pub fn collect_documents(
    root: &Path,
    exclude: Option<&Path>,
    skip_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let exclude = exclude.and_then(|p| std::fs::canonicalize(p).ok());
    let skip_dir = skip_dir.and_then(|p| std::fs::canonicalize(p).ok());
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        // A scratch area inside the input tree holds this run's own files.
        .filter_entry(|e| match &skip_dir {
            Some(skip) if e.depth() > 0 && e.file_type().is_dir() => {
                std::fs::canonicalize(e.path()).ok().as_ref() != Some(skip)
            }
            _ => true,
        })
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_document(e.path()))
        .filter(|e| match &exclude {
            Some(out) if std::fs::canonicalize(e.path()).ok().as_ref() == Some(out) => {
                debug!("Ignoring previous output: {}", e.path().display());
                false
            }
            _ => true,
        })
        .map(|e| e.into_path())
        .collect()
}

/// First free `<stem>.pdf`, `<stem> (2).pdf`, … in `staging`.
pub fn staging_target(staging: &Path, doc: &Path) -> PathBuf {
    let stem = doc
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let first = staging.join(format!("{stem}.pdf"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| staging.join(format!("{stem} ({n}).pdf")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}
