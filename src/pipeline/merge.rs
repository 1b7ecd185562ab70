//! PDF merging: many staged PDFs → one output file.
//!
//! ## Backend cascade
//!
//! ```text
//! inputs ──▶ LopdfMerger ──fail──▶ QpdfMerger ──fail──▶ PdfiumMerger ──fail──▶ MergeFailed
//!            (stream append)       (page-tree splice)   (render-level insert)
//! ```
//!
//! Every backend writes to `<output>.tmp`. The engine renames the temp file
//! over the output when a backend succeeds and deletes it when it fails, so
//! the output path only ever holds one backend's complete result.
//!
//! Within one backend an input that cannot be read is skipped and reported.
//! A backend that could not add a single input counts as failed, so the next
//! backend gets a chance at the same list.

use crate::config::PipelineConfig;
use crate::error::{Attempt, BackendError, DocMergeError};
use crate::output::{ItemFailure, MergeReport};
use crate::pipeline::process::run_tool;
use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one backend managed to put in its output file.
#[derive(Debug, Default)]
pub struct MergedPages {
    /// Inputs that contributed pages, in input order.
    pub merged: Vec<PathBuf>,
    pub skipped: Vec<ItemFailure>,
    pub page_count: Option<usize>,
}

impl MergedPages {
    fn skip(&mut self, path: &Path, error: impl ToString) {
        let error = error.to_string();
        warn!("Skipping {} in merge: {}", path.display(), error);
        self.skipped.push(ItemFailure {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// One way of concatenating PDFs.
#[async_trait]
pub trait MergeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Write every readable input, in order, into `output`.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergedPages, BackendError>;
}

/// Ordered merge cascade.
#[derive(Clone)]
pub struct MergeEngine {
    backends: Vec<Arc<dyn MergeBackend>>,
}

impl MergeEngine {
    pub fn new(backends: Vec<Arc<dyn MergeBackend>>) -> Self {
        Self { backends }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(vec![
            Arc::new(LopdfMerger),
            Arc::new(QpdfMerger {
                program: config.qpdf_program.clone(),
                timeout: config.process_timeout,
            }),
            Arc::new(PdfiumMerger {
                library: config.pdfium_library.clone(),
            }),
        ])
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Merge `inputs`, in order, into `output`.
    pub async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergeReport, DocMergeError> {
        if inputs.is_empty() {
            return Err(DocMergeError::NoInput);
        }

        let tmp = temp_output_path(output);
        let mut attempts = Vec::new();
        info!("Merging {} PDF(s) into {}", inputs.len(), output.display());

        for backend in &self.backends {
            let _ = tokio::fs::remove_file(&tmp).await;
            let result = match backend.merge(inputs, &tmp).await {
                Ok(pages) if pages.merged.is_empty() => Err(BackendError::NothingMerged {
                    backend: backend.name().into(),
                    total: inputs.len(),
                }),
                Ok(pages) => match tokio::fs::rename(&tmp, output).await {
                    Ok(()) => Ok(pages),
                    Err(e) => Err(BackendError::Io(e)),
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(pages) => {
                    info!(
                        "{} merged {} of {} PDF(s) into {}",
                        backend.name(),
                        pages.merged.len(),
                        inputs.len(),
                        output.display()
                    );
                    return Ok(MergeReport {
                        output: output.to_path_buf(),
                        backend: backend.name().to_string(),
                        merged: pages.merged,
                        skipped: pages.skipped,
                        failed_backends: attempts,
                        page_count: pages.page_count,
                    });
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    if e.is_unavailable() {
                        debug!("{} skipped: {}", backend.name(), e);
                    } else {
                        warn!("{} failed, trying next backend: {}", backend.name(), e);
                    }
                    attempts.push(Attempt::new(backend.name(), &e));
                }
            }
        }

        Err(DocMergeError::MergeFailed {
            output: output.to_path_buf(),
            attempts,
        })
    }
}

/// `out.pdf` → `out.pdf.tmp`, next to the output so the rename stays on one
/// filesystem.
fn temp_output_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    output.with_file_name(name)
}

// ── lopdf ────────────────────────────────────────────────────────────────

/// Loads every input with `lopdf` and splices their pages under one fresh
/// page tree.
pub struct LopdfMerger;

#[async_trait]
impl MergeBackend for LopdfMerger {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergedPages, BackendError> {
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || merge_with_lopdf(&inputs, &output))
            .await
            .map_err(|e| BackendError::failed("lopdf", format!("merge task panicked: {e}")))?
    }
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

fn merge_with_lopdf(inputs: &[PathBuf], output: &Path) -> Result<MergedPages, BackendError> {
    let mut merged = Document::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    let mut result = MergedPages::default();

    for path in inputs {
        let mut doc = match Document::load(path) {
            Ok(doc) => doc,
            Err(e) => {
                result.skip(path, e);
                continue;
            }
        };
        if doc.is_encrypted() {
            result.skip(path, "encrypted");
            continue;
        }

        doc.renumber_objects_with(merged.max_id + 1);
        match adopt_pages(&mut doc, pages_id) {
            Ok(page_ids) if page_ids.is_empty() => {
                result.skip(path, "no pages");
                continue;
            }
            Ok(page_ids) => kids.extend(page_ids.into_iter().map(Object::Reference)),
            Err(e) => {
                result.skip(path, e);
                continue;
            }
        }

        merged.max_id = doc.max_id;
        merged.objects.extend(doc.objects);
        result.merged.push(path.clone());
        debug!("lopdf: added {}", path.display());
    }

    if result.merged.is_empty() {
        return Ok(result);
    }

    let page_count = kids.len();
    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(page_count as i64));
    pages.set("Kids", Object::Array(kids));
    merged.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = merged.add_object(catalog);
    merged.trailer.set("Root", Object::Reference(catalog_id));

    // Old catalogs and intermediate page-tree nodes are unreachable now.
    merged.prune_objects();
    merged
        .save(output)
        .map_err(|e| BackendError::failed("lopdf", format!("save failed: {e}")))?;

    result.page_count = Some(page_count);
    Ok(result)
}

/// Re-parent every page of `doc` under `parent`, copying inherited
/// attributes down first so they survive losing their old ancestors.
fn adopt_pages(doc: &mut Document, parent: ObjectId) -> Result<Vec<ObjectId>, lopdf::Error> {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for &page_id in &page_ids {
        let inherited = inherited_attributes(doc, page_id);
        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        for (key, value) in inherited {
            page.set(key.to_vec(), value);
        }
        page.set("Parent", Object::Reference(parent));
    }
    Ok(page_ids)
}

fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let mut found = Vec::new();
    let Ok(page) = doc.get_dictionary(page_id) else {
        return found;
    };
    let mut missing: Vec<&'static [u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();

    let mut next = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut hops = 0;
    while let Some(node_id) = next {
        // Malformed trees can loop.
        if missing.is_empty() || hops > 64 {
            break;
        }
        hops += 1;
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });
        next = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    found
}

// ── qpdf ─────────────────────────────────────────────────────────────────

/// `qpdf --empty --pages <inputs…> -- <output>`.
///
/// Every input is probed with `--show-npages` first; qpdf aborts the whole
/// splice on one unreadable file, so bad inputs are dropped up front.
pub struct QpdfMerger {
    pub program: PathBuf,
    pub timeout: Option<Duration>,
}

/// qpdf exits 3 when it succeeded with warnings.
const QPDF_WARNINGS: &[i32] = &[3];

#[async_trait]
impl MergeBackend for QpdfMerger {
    fn name(&self) -> &'static str {
        "qpdf"
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergedPages, BackendError> {
        let mut result = MergedPages::default();
        let mut pages = 0usize;

        for path in inputs {
            let probe = run_tool(
                &self.program,
                [Path::new("--show-npages"), path.as_path()],
                self.timeout,
                QPDF_WARNINGS,
            )
            .await;
            match probe {
                Ok(out) => {
                    pages += String::from_utf8_lossy(&out.stdout)
                        .trim()
                        .parse::<usize>()
                        .unwrap_or(0);
                    result.merged.push(path.clone());
                }
                // No point probing the rest without the program.
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => result.skip(path, e),
            }
        }

        if result.merged.is_empty() {
            return Ok(result);
        }

        let mut args: Vec<&Path> = vec![Path::new("--empty"), Path::new("--pages")];
        args.extend(result.merged.iter().map(PathBuf::as_path));
        args.push(Path::new("--"));
        args.push(output);
        run_tool(&self.program, &args, self.timeout, QPDF_WARNINGS).await?;

        result.page_count = Some(pages);
        Ok(result)
    }
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Imports every input's pages into a new document through pdfium.
///
/// Library lookup order: the configured path, `PDFIUM_LIB_PATH`, the working
/// directory, then the system library. Either path may name the library
/// file itself or the directory holding it.
pub struct PdfiumMerger {
    pub library: Option<PathBuf>,
}

#[async_trait]
impl MergeBackend for PdfiumMerger {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergedPages, BackendError> {
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        let library = self.library.clone();
        // pdfium is not async-safe; keep it on the blocking pool.
        tokio::task::spawn_blocking(move || merge_with_pdfium(library.as_deref(), &inputs, &output))
            .await
            .map_err(|e| BackendError::failed("pdfium", format!("merge task panicked: {e}")))?
    }
}

fn bind_pdfium(library: Option<&Path>) -> Result<Pdfium, BackendError> {
    let from_env = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
    let mut candidates: Vec<PathBuf> = library.map(Path::to_path_buf).into_iter().collect();
    candidates.extend(from_env);
    candidates.push(PathBuf::from("./"));

    let mut reasons = Vec::new();
    for candidate in candidates {
        let path = if candidate.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&candidate)
        } else {
            candidate
        };
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", path.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => reasons.push(format!("{}: {e}", path.display())),
        }
    }
    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            reasons.push(format!("system library: {e}"));
            Err(BackendError::Unavailable {
                backend: "pdfium".into(),
                reason: reasons.join("; "),
            })
        }
    }
}

fn merge_with_pdfium(
    library: Option<&Path>,
    inputs: &[PathBuf],
    output: &Path,
) -> Result<MergedPages, BackendError> {
    let pdfium = bind_pdfium(library)?;
    let mut merged = pdfium
        .create_new_pdf()
        .map_err(|e| BackendError::failed("pdfium", format!("create document: {e}")))?;
    let mut result = MergedPages::default();

    for path in inputs {
        let source = match pdfium.load_pdf_from_file(path, None) {
            Ok(doc) => doc,
            Err(e) => {
                result.skip(path, e);
                continue;
            }
        };
        match merged.pages_mut().append(&source) {
            Ok(()) => result.merged.push(path.clone()),
            Err(e) => result.skip(path, e),
        }
    }

    if result.merged.is_empty() {
        return Ok(result);
    }

    let page_count = merged.pages().len() as usize;
    merged
        .save_to_file(output)
        .map_err(|e| BackendError::failed("pdfium", format!("save failed: {e}")))?;
    result.page_count = Some(page_count);
    Ok(result)
}
