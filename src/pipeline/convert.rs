//! Document conversion: one office document or PDF → one PDF file.
//!
//! ## Chains
//!
//! Each [`DocumentKind`] has its own ordered chain of backends:
//!
//! | Kind | Chain |
//! |------|-------|
//! | Word | `docx2pdf` |
//! | Presentation | office automation (PowerPoint) → headless office |
//! | Spreadsheet | office automation (Excel) → headless office |
//! | Pdf | byte copy |
//!
//! The first backend that leaves the output file on disk wins. A backend
//! that exits cleanly but writes nothing counts as a failure, and the chain
//! moves on. Backends that cannot run on this host are skipped and recorded.

use crate::config::PipelineConfig;
use crate::error::{Attempt, BackendError, DocMergeError};
use crate::kind::DocumentKind;
use crate::output::ConversionResult;
use crate::pipeline::process::run_tool;
use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One way of turning a document into a PDF.
#[async_trait]
pub trait ConvertBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can run on the current host at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Write a PDF rendition of `source` to `output`.
    async fn convert(&self, source: &Path, output: &Path) -> Result<(), BackendError>;
}

/// Per-kind conversion chains.
#[derive(Clone, Default)]
pub struct DocumentConverter {
    chains: HashMap<DocumentKind, Vec<Arc<dyn ConvertBackend>>>,
}

impl DocumentConverter {
    /// Chains built from the configured program paths.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let timeout = config.process_timeout;
        let headless: Arc<dyn ConvertBackend> = Arc::new(HeadlessOffice {
            program: config.soffice_program.clone(),
            timeout,
        });
        let automation = |app| -> Arc<dyn ConvertBackend> {
            Arc::new(OfficeAutomation {
                app,
                powershell: config.powershell_program.clone(),
                timeout,
            })
        };

        Self::default()
            .with_chain(
                DocumentKind::Word,
                vec![Arc::new(Docx2PdfBackend {
                    program: config.docx2pdf_program.clone(),
                    timeout,
                })],
            )
            .with_chain(
                DocumentKind::Presentation,
                vec![automation(OfficeApp::PowerPoint), headless.clone()],
            )
            .with_chain(
                DocumentKind::Spreadsheet,
                vec![automation(OfficeApp::Excel), headless],
            )
            .with_chain(DocumentKind::Pdf, vec![Arc::new(PdfCopy)])
    }

    /// Replace the chain for one kind.
    pub fn with_chain(mut self, kind: DocumentKind, chain: Vec<Arc<dyn ConvertBackend>>) -> Self {
        self.chains.insert(kind, chain);
        self
    }

    pub fn chain_names(&self, kind: DocumentKind) -> Vec<&'static str> {
        self.chains
            .get(&kind)
            .map(|c| c.iter().map(|b| b.name()).collect())
            .unwrap_or_default()
    }

    /// Convert `doc` to `<out_dir>/<stem>.pdf` and return that path.
    pub async fn convert(&self, doc: &Path, out_dir: &Path) -> Result<PathBuf, DocMergeError> {
        let stem = doc
            .file_stem()
            .ok_or_else(|| DocMergeError::UnsupportedDocument {
                path: doc.to_path_buf(),
            })?;
        let mut target = out_dir.join(stem);
        target.set_extension("pdf");
        self.convert_to(doc, &target).await.map(|r| r.output_pdf)
    }

    /// Convert `doc` to exactly `output_pdf`.
    pub async fn convert_to(
        &self,
        doc: &Path,
        output_pdf: &Path,
    ) -> Result<ConversionResult, DocMergeError> {
        let unsupported = || DocMergeError::UnsupportedDocument {
            path: doc.to_path_buf(),
        };
        let kind = DocumentKind::from_path(doc).ok_or_else(unsupported)?;
        let chain = self.chains.get(&kind).ok_or_else(unsupported)?;

        if let Some(parent) = output_pdf.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Err(DocMergeError::ConversionFailed {
                    path: doc.to_path_buf(),
                    attempts: vec![Attempt::new("setup", &BackendError::Io(e))],
                });
            }
        }
        // A stale file would make a silent backend look successful.
        if !same_file(doc, output_pdf) {
            let _ = tokio::fs::remove_file(output_pdf).await;
        }

        info!("Converting {} ({})", doc.display(), kind);
        let mut attempts = Vec::new();
        for backend in chain {
            if !backend.is_available() {
                debug!("{} is not available on this host", backend.name());
                attempts.push(Attempt::new(
                    backend.name(),
                    &BackendError::Unavailable {
                        backend: backend.name().into(),
                        reason: "not supported on this platform".into(),
                    },
                ));
                continue;
            }

            let result = match backend.convert(doc, output_pdf).await {
                Ok(()) if tokio::fs::try_exists(output_pdf).await.unwrap_or(false) => Ok(()),
                Ok(()) => Err(BackendError::MissingOutput {
                    backend: backend.name().into(),
                    path: output_pdf.to_path_buf(),
                }),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    debug!("{} converted {}", backend.name(), doc.display());
                    return Ok(ConversionResult {
                        source: doc.to_path_buf(),
                        output_pdf: output_pdf.to_path_buf(),
                        kind,
                        backend: backend.name().to_string(),
                    });
                }
                Err(e) => {
                    if e.is_unavailable() {
                        debug!("{} skipped {}: {}", backend.name(), doc.display(), e);
                    } else {
                        warn!("{} failed on {}: {}", backend.name(), doc.display(), e);
                    }
                    attempts.push(Attempt::new(backend.name(), &e));
                }
            }
        }

        Err(DocMergeError::ConversionFailed {
            path: doc.to_path_buf(),
            attempts,
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn absolute(path: &Path) -> Result<PathBuf, BackendError> {
    Ok(std::path::absolute(path)?)
}

// ── Word ─────────────────────────────────────────────────────────────────

/// Dedicated Word converter: `docx2pdf <input> <output>`.
pub struct Docx2PdfBackend {
    pub program: PathBuf,
    pub timeout: Option<Duration>,
}

#[async_trait]
impl ConvertBackend for Docx2PdfBackend {
    fn name(&self) -> &'static str {
        "docx2pdf"
    }

    async fn convert(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        run_tool(&self.program, [source, output], self.timeout, &[]).await?;
        Ok(())
    }
}

// ── Office automation ────────────────────────────────────────────────────

/// Host office application driven over COM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeApp {
    PowerPoint,
    Excel,
}

/// Drives PowerPoint or Excel through a PowerShell COM script.
///
/// Windows only. The script closes the document and quits the application
/// in `finally` blocks, so no office process outlives a failed export.
pub struct OfficeAutomation {
    pub app: OfficeApp,
    pub powershell: PathBuf,
    pub timeout: Option<Duration>,
}

impl OfficeAutomation {
    fn script(&self, source: &Path, output: &Path) -> String {
        let src = ps_quote(source);
        let out = ps_quote(output);
        let body = match self.app {
            OfficeApp::PowerPoint => format!(
                "$app = New-Object -ComObject PowerPoint.Application\n\
                 try {{\n\
                 \x20 $doc = $app.Presentations.Open({src}, $true, $false, $false)\n\
                 \x20 try {{ $doc.SaveAs({out}, 32) }} finally {{ $doc.Close() }}\n\
                 }} finally {{\n\
                 \x20 $app.Quit()\n\
                 \x20 [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($app)\n\
                 }}"
            ),
            OfficeApp::Excel => format!(
                "$app = New-Object -ComObject Excel.Application\n\
                 $app.Visible = $false\n\
                 $app.DisplayAlerts = $false\n\
                 try {{\n\
                 \x20 $wb = $app.Workbooks.Open({src})\n\
                 \x20 try {{ $wb.ExportAsFixedFormat(0, {out}) }} finally {{ $wb.Close($false) }}\n\
                 }} finally {{\n\
                 \x20 $app.Quit()\n\
                 \x20 [void][System.Runtime.InteropServices.Marshal]::ReleaseComObject($app)\n\
                 }}"
            ),
        };
        format!("$ErrorActionPreference = 'Stop'\n{body}")
    }
}

/// Single-quoted PowerShell literal; embedded quotes are doubled.
fn ps_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "''"))
}

#[async_trait]
impl ConvertBackend for OfficeAutomation {
    fn name(&self) -> &'static str {
        match self.app {
            OfficeApp::PowerPoint => "powerpoint",
            OfficeApp::Excel => "excel",
        }
    }

    fn is_available(&self) -> bool {
        cfg!(windows)
    }

    async fn convert(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        // COM resolves relative paths against the application's own cwd.
        let script = self.script(&absolute(source)?, &absolute(output)?);
        run_tool(
            &self.powershell,
            ["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
            self.timeout,
            &[],
        )
        .await?;
        Ok(())
    }
}

// ── Headless office ──────────────────────────────────────────────────────

/// `soffice --headless --convert-to pdf`.
///
/// soffice only lets us pick an output directory, and names the file after
/// the source stem. It writes into a private temp directory next to the
/// target and the result is renamed into place, so two sources with the same
/// stem never clobber each other.
pub struct HeadlessOffice {
    pub program: PathBuf,
    pub timeout: Option<Duration>,
}

#[async_trait]
impl ConvertBackend for HeadlessOffice {
    fn name(&self) -> &'static str {
        "soffice"
    }

    async fn convert(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let outdir = tempfile::Builder::new()
            .prefix(".soffice_")
            .tempdir_in(&parent)?;

        run_tool(
            &self.program,
            [
                OsStr::new("--headless"),
                OsStr::new("--convert-to"),
                OsStr::new("pdf"),
                OsStr::new("--outdir"),
                outdir.path().as_os_str(),
                source.as_os_str(),
            ],
            self.timeout,
            &[],
        )
        .await?;

        adopt_produced(outdir.path(), source, output, self.name()).await
    }
}

/// Move `<dir>/<source stem>.pdf` to `output`.
async fn adopt_produced(
    dir: &Path,
    source: &Path,
    output: &Path,
    backend: &str,
) -> Result<(), BackendError> {
    let mut produced = dir.join(source.file_stem().unwrap_or_default());
    produced.set_extension("pdf");
    if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
        return Err(BackendError::MissingOutput {
            backend: backend.into(),
            path: produced,
        });
    }
    tokio::fs::rename(&produced, output).await?;
    Ok(())
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// PDFs need no conversion; the file is copied into place.
pub struct PdfCopy;

#[async_trait]
impl ConvertBackend for PdfCopy {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn convert(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        if same_file(source, output) {
            return Ok(());
        }
        tokio::fs::copy(source, output).await?;
        Ok(())
    }
}
