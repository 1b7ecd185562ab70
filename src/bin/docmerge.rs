//! CLI binary for edgequake-docmerge.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docmerge::{
    resolve_input_dir, run, PipelineConfig, PipelineProgressCallback, ProgressCallback, RunOutcome,
    RunReport, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the current stage, plus one
/// log line per archive and document.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self::with_bar(bar)
    }

    fn with_bar(bar: ProgressBar) -> Arc<Self> {
        bar.set_prefix("Starting");
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }

    fn fail_line(&self, path: &Path, error: &str) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        // Keep the log readable; the full error is in the JSON report.
        let msg: String = if error.chars().count() > 100 {
            let head: String = error.chars().take(99).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            file_name(path),
            red(&msg)
        ));
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// A run that fails before `CleaningUp` never clears the spinner itself.
impl Drop for CliProgressCallback {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        if stage == Stage::CleaningUp {
            self.bar.finish_and_clear();
            return;
        }
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("");
    }

    fn on_archive_extracted(&self, archive: &Path, _dest: &Path, backend: &str) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            file_name(archive),
            dim(&format!("unpacked via {backend}"))
        ));
    }

    fn on_archive_failed(&self, archive: &Path, error: &str) {
        self.fail_line(archive, error);
    }

    fn on_document_converted(&self, source: &Path, _pdf: &Path, backend: &str) {
        self.bar.set_message(file_name(source));
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            file_name(source),
            dim(&format!("via {backend}"))
        ));
    }

    fn on_document_failed(&self, source: &Path, error: &str) {
        self.fail_line(source, error);
    }

    fn on_merge_complete(&self, output: &Path, backend: &str, merged: usize, skipped: usize) {
        self.bar.println(format!(
            "  {} {} PDF(s) → {}  {}",
            green("✓"),
            merged,
            file_name(output),
            dim(&format!("via {backend}, {skipped} skipped"))
        ));
    }

    fn on_merge_failed(&self, error: &str) {
        self.bar.println(format!("  {} {}", red("✗"), red(error)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process the current directory
  docmerge

  # Process a directory; writes bundle/合并文档.pdf
  docmerge bundle/

  # Custom output name, unbounded archive nesting
  docmerge --output-name combined.pdf --max-depth 0 bundle/

  # Machine-readable report, non-zero exit when nothing was merged
  docmerge --json --strict bundle/ > report.json

EXTERNAL TOOLS (used when present, skipped otherwise):
  Archives     unzip, 7z / 7za / 7zr, unrar, unar, bsdtar, tar, gzip, bzip2, xz
  Word         docx2pdf
  PowerPoint   PowerPoint (Windows) → soffice
  Excel        Excel (Windows) → soffice
  Merge        built-in (lopdf) → qpdf → pdfium

ENVIRONMENT VARIABLES:
  RUST_LOG          Override the log filter (e.g. edgequake_docmerge=debug)
  PDFIUM_LIB_PATH   pdfium library file or directory for the last-resort merger
"#;

/// Unpack nested archives, convert office documents and merge everything into one PDF.
#[derive(Parser, Debug)]
#[command(
    name = "docmerge",
    version,
    about = "Unpack archives, convert office documents and merge them into one PDF",
    long_about = "Recursively unpacks every archive under INPUT_DIR, converts every Word, \
PowerPoint, Excel and PDF document to PDF, and merges the results, sorted by name, into \
INPUT_DIR/合并文档.pdf. Items that cannot be processed are reported and skipped.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory to process. Missing or invalid: the current directory.
    input_dir: Option<PathBuf>,

    /// File name of the merged PDF, written into INPUT_DIR.
    #[arg(long, env = "DOCMERGE_OUTPUT_NAME", default_value = edgequake_docmerge::DEFAULT_OUTPUT_NAME)]
    output_name: String,

    /// Output directory created at start.
    #[arg(long, env = "DOCMERGE_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Maximum archive nesting depth (0 = unbounded).
    #[arg(long, env = "DOCMERGE_MAX_DEPTH", default_value_t = 32)]
    max_depth: usize,

    /// Headless office executable.
    #[arg(long, env = "DOCMERGE_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Word-to-PDF converter executable.
    #[arg(long, env = "DOCMERGE_DOCX2PDF", default_value = "docx2pdf")]
    docx2pdf: PathBuf,

    /// qpdf executable.
    #[arg(long, env = "DOCMERGE_QPDF", default_value = "qpdf")]
    qpdf: PathBuf,

    /// pdfium library file or directory.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Kill an external tool after this many seconds.
    #[arg(long, env = "DOCMERGE_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "DOCMERGE_JSON")]
    json: bool,

    /// Exit non-zero when no merged PDF was produced.
    #[arg(long, env = "DOCMERGE_STRICT")]
    strict: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCMERGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCMERGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCMERGE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner prints its own per-item lines; keep INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    // Failures are reported, not signalled, unless --strict asks for it.
    match execute(&cli, progress_cb).await {
        Ok(report) => {
            let produced = report.output_path().is_some();
            if cli.strict && !produced {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:#}", e);
            if !cli.quiet {
                eprintln!("{} {:#}", red("✘"), e);
            }
            if cli.strict {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

async fn execute(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RunReport> {
    let config = build_config(cli, progress)?;
    let input_dir = resolve_input_dir(cli.input_dir.as_deref());

    let report = run(&input_dir, &config)
        .await
        .with_context(|| format!("Processing {} failed", input_dir.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    }
    if !cli.quiet {
        print_summary(&report);
    }
    Ok(report)
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .output_name(&cli.output_name)
        .output_dir(&cli.output_dir)
        .max_archive_depth((cli.max_depth > 0).then_some(cli.max_depth))
        .soffice_program(&cli.soffice)
        .docx2pdf_program(&cli.docx2pdf)
        .qpdf_program(&cli.qpdf);

    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.process_timeout(Duration::from_secs(secs));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &RunReport) {
    let converted =
        report.extracted_documents.converted.len() + report.input_documents.converted.len();
    let failed = report.conversion_failures();
    let archives = report.unpack.extracted.len();

    match &report.outcome {
        RunOutcome::Merged(m) => {
            eprintln!(
                "{}  {} PDF(s)  {}  →  {}",
                if report.has_partial_failures() {
                    cyan("⚠")
                } else {
                    green("✔")
                },
                m.merged.len(),
                dim(&format!(
                    "{} archive(s), {} converted, {} failed, {}ms",
                    archives, converted, failed, report.duration_ms
                )),
                bold(&m.output.display().to_string()),
            );
        }
        RunOutcome::NothingToProcess => {
            eprintln!(
                "{}  No documents found, nothing to process  {}",
                cyan("⚠"),
                dim(&format!("{failed} failed, {}ms", report.duration_ms)),
            );
        }
        RunOutcome::MergeFailed { attempts } => {
            eprintln!("{}  Merge failed, no output written", red("✘"));
            for attempt in attempts {
                eprintln!("   {}", dim(&attempt.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_is_cleared_when_the_run_ends_early() {
        let bar = ProgressBar::hidden();
        let cb = CliProgressCallback::with_bar(bar.clone());
        cb.on_stage(Stage::Unpacking);
        assert!(!bar.is_finished());

        drop(cb);
        assert!(bar.is_finished());
    }

    #[test]
    fn cleaning_up_finishes_the_spinner() {
        let bar = ProgressBar::hidden();
        let cb = CliProgressCallback::with_bar(bar.clone());
        cb.on_stage(Stage::CleaningUp);
        assert!(bar.is_finished());
    }
}
