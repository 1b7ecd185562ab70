//! Configuration types for a document-merge run.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The defaults reproduce the plain
//! `docmerge [DIR]` behaviour: output named `合并文档.pdf` inside the input
//! directory, scratch area in the system temp dir, external tools looked up
//! on `PATH`, no process timeout.

use crate::error::DocMergeError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the merged PDF written into the input directory.
pub const DEFAULT_OUTPUT_NAME: &str = "合并文档.pdf";

/// Prefix of the per-run scratch directory.
pub const SCRATCH_PREFIX: &str = "doc_processor_";

/// Configuration for one pipeline run.
///
/// # Example
/// ```rust
/// use edgequake_docmerge::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::builder()
///     .output_name("bundle.pdf")
///     .max_archive_depth(Some(8))
///     .process_timeout(Duration::from_secs(300))
///     .build()
///     .unwrap();
/// assert_eq!(config.output_name, "bundle.pdf");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// File name of the merged PDF, written into the input directory.
    /// Default: `合并文档.pdf`.
    pub output_name: String,

    /// Reserved output directory, created at start. Relative paths resolve
    /// against the current working directory. Default: `output`.
    pub output_dir: PathBuf,

    /// Parent of the scratch directory. `None` uses the system temp dir.
    pub scratch_parent: Option<PathBuf>,

    /// Maximum archive nesting depth. An archive found directly in the input
    /// tree is depth 1. `None` means unbounded. Default: 32.
    pub max_archive_depth: Option<usize>,

    /// Headless office converter executable. Default: `soffice`.
    pub soffice_program: PathBuf,

    /// Dedicated Word converter executable. Default: `docx2pdf`.
    pub docx2pdf_program: PathBuf,

    /// PowerShell executable used for office automation on Windows.
    /// Default: `powershell`.
    pub powershell_program: PathBuf,

    /// qpdf executable used by the page-splice merger. Default: `qpdf`.
    pub qpdf_program: PathBuf,

    /// Explicit pdfium library path for the render-level merger.
    /// `None` tries the working directory, then the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Kill an external process after this long. Default: no timeout.
    pub process_timeout: Option<Duration>,

    /// Optional progress callback for per-item events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            output_dir: PathBuf::from("output"),
            scratch_parent: None,
            max_archive_depth: Some(32),
            soffice_program: PathBuf::from("soffice"),
            docx2pdf_program: PathBuf::from("docx2pdf"),
            powershell_program: PathBuf::from("powershell"),
            qpdf_program: PathBuf::from("qpdf"),
            pdfium_library: None,
            process_timeout: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("output_name", &self.output_name)
            .field("output_dir", &self.output_dir)
            .field("scratch_parent", &self.scratch_parent)
            .field("max_archive_depth", &self.max_archive_depth)
            .field("soffice_program", &self.soffice_program)
            .field("docx2pdf_program", &self.docx2pdf_program)
            .field("powershell_program", &self.powershell_program)
            .field("qpdf_program", &self.qpdf_program)
            .field("pdfium_library", &self.pdfium_library)
            .field("process_timeout", &self.process_timeout)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_name = name.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn scratch_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_parent = Some(dir.into());
        self
    }

    pub fn max_archive_depth(mut self, depth: Option<usize>) -> Self {
        self.config.max_archive_depth = depth;
        self
    }

    pub fn soffice_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.soffice_program = program.into();
        self
    }

    pub fn docx2pdf_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.docx2pdf_program = program.into();
        self
    }

    pub fn powershell_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.powershell_program = program.into();
        self
    }

    pub fn qpdf_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.qpdf_program = program.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn process_timeout(mut self, timeout: Duration) -> Self {
        self.config.process_timeout = Some(timeout);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<PipelineConfig, DocMergeError> {
        self.config.output_name = self.config.output_name.trim().to_string();
        let c = &self.config;
        let name = c.output_name.as_str();
        if name.is_empty() {
            return Err(DocMergeError::InvalidConfig(
                "Output name must not be empty".into(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(DocMergeError::InvalidConfig(format!(
                "Output name must be a bare file name, got '{}'",
                name
            )));
        }
        if !name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(DocMergeError::InvalidConfig(format!(
                "Output name must end in .pdf, got '{}'",
                name
            )));
        }
        if c.max_archive_depth == Some(0) {
            return Err(DocMergeError::InvalidConfig(
                "Archive depth must be ≥ 1 (use None for unbounded)".into(),
            ));
        }
        if c.process_timeout == Some(Duration::ZERO) {
            return Err(DocMergeError::InvalidConfig(
                "Process timeout must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}
