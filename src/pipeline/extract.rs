//! Archive extraction: one archive → one destination directory.
//!
//! ## Backend cascade
//!
//! ```text
//! archive ──▶ NativeExtractor ──fail──▶ ToolExtractor ──fail──▶ ExtractionFailed
//!             (zip/tar/gz crates)       (format database of CLI tools)
//! ```
//!
//! The native backend needs nothing installed but only understands zip, tar
//! and gzip. The tool backend looks the format up in a small database of
//! command recipes (`unzip`, `7z`, `unrar`, `bsdtar`, …) and runs the first
//! one that is installed and succeeds. A failed attempt may leave files in
//! the destination; nothing is rolled back.

use crate::config::PipelineConfig;
use crate::error::{Attempt, BackendError, DocMergeError};
use crate::kind::ArchiveFormat;
use crate::pipeline::process::run_tool;
use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One way of unpacking an archive.
#[async_trait]
pub trait ExtractBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unpack `archive` into the existing directory `dest`.
    async fn extract(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
    ) -> Result<(), BackendError>;
}

/// Ordered extraction cascade.
#[derive(Clone)]
pub struct ArchiveExtractor {
    backends: Vec<Arc<dyn ExtractBackend>>,
}

impl ArchiveExtractor {
    pub fn new(backends: Vec<Arc<dyn ExtractBackend>>) -> Self {
        Self { backends }
    }

    /// The default cascade: native decoders first, then external tools.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(vec![
            Arc::new(NativeExtractor),
            Arc::new(ToolExtractor::new(config.process_timeout)),
        ])
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Extract `archive` into `dest`, returning the name of the backend that
    /// succeeded.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<&'static str, DocMergeError> {
        let format = ArchiveFormat::from_path(archive).ok_or_else(|| DocMergeError::NotAnArchive {
            path: archive.to_path_buf(),
        })?;

        let mut attempts = Vec::new();
        if let Err(e) = tokio::fs::create_dir_all(dest).await {
            attempts.push(Attempt::new("setup", &BackendError::Io(e)));
            return Err(DocMergeError::ExtractionFailed {
                path: archive.to_path_buf(),
                attempts,
            });
        }

        info!("Extracting: {}", archive.display());
        for backend in &self.backends {
            match backend.extract(archive, format, dest).await {
                Ok(()) => {
                    debug!("{} extracted {}", backend.name(), archive.display());
                    return Ok(backend.name());
                }
                Err(e) => {
                    if e.is_unavailable() {
                        debug!("{} skipped {}: {}", backend.name(), archive.display(), e);
                    } else {
                        warn!(
                            "{} failed on {}, trying next backend: {}",
                            backend.name(),
                            archive.display(),
                            e
                        );
                    }
                    attempts.push(Attempt::new(backend.name(), &e));
                }
            }
        }

        Err(DocMergeError::ExtractionFailed {
            path: archive.to_path_buf(),
            attempts,
        })
    }
}

// ── Native backend ───────────────────────────────────────────────────────

/// In-process decoding with the `zip`, `tar` and `flate2` crates.
///
/// Runs on the blocking pool: decompression is CPU-bound and the crates use
/// synchronous I/O.
pub struct NativeExtractor;

#[async_trait]
impl ExtractBackend for NativeExtractor {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn extract(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
    ) -> Result<(), BackendError> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_native_blocking(&archive, format, &dest))
            .await
            .map_err(|e| BackendError::failed("native", format!("extract task panicked: {e}")))?
    }
}

fn extract_native_blocking(
    archive: &Path,
    format: ArchiveFormat,
    dest: &Path,
) -> Result<(), BackendError> {
    match format {
        ArchiveFormat::Zip => {
            let reader = BufReader::new(File::open(archive)?);
            let mut zip = zip::ZipArchive::new(reader)
                .map_err(|e| BackendError::failed("native", format!("zip: {e}")))?;
            zip.extract(dest)
                .map_err(|e| BackendError::failed("native", format!("zip: {e}")))
        }
        ArchiveFormat::Tar => {
            let reader = BufReader::new(File::open(archive)?);
            tar::Archive::new(reader)
                .unpack(dest)
                .map_err(|e| BackendError::failed("native", format!("tar: {e}")))
        }
        ArchiveFormat::Gz if format.is_compressed_tarball(archive) => {
            let gz = MultiGzDecoder::new(BufReader::new(File::open(archive)?));
            tar::Archive::new(gz)
                .unpack(dest)
                .map_err(|e| BackendError::failed("native", format!("tar.gz: {e}")))
        }
        ArchiveFormat::Gz => {
            let mut gz = MultiGzDecoder::new(BufReader::new(File::open(archive)?));
            let target = dest.join(decompressed_name(archive));
            let mut out = File::create(&target)?;
            if let Err(e) = std::io::copy(&mut gz, &mut out) {
                drop(out);
                let _ = std::fs::remove_file(&target);
                return Err(BackendError::failed("native", format!("gzip: {e}")));
            }
            Ok(())
        }
        other => Err(BackendError::unsupported("native", other)),
    }
}

/// `notes.pdf.gz` → `notes.pdf`.
fn decompressed_name(archive: &Path) -> PathBuf {
    archive
        .file_stem()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("decompressed"))
}

// ── Tool backend ─────────────────────────────────────────────────────────

/// Where a recipe's program leaves the unpacked data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolOutput {
    /// Writes files into the destination directory itself.
    IntoDest,
    /// Writes the decompressed stream to stdout.
    Stdout,
}

/// One external command able to unpack a format.
///
/// `{archive}` and `{dest}` in `args` are replaced by the archive path and
/// the destination directory; `{dest}` may appear inside a larger argument
/// (`-o{dest}`).
#[derive(Debug)]
struct ToolRecipe {
    program: &'static str,
    args: &'static [&'static str],
    output: ToolOutput,
}

const fn dest_recipe(program: &'static str, args: &'static [&'static str]) -> ToolRecipe {
    ToolRecipe {
        program,
        args,
        output: ToolOutput::IntoDest,
    }
}

const fn stdout_recipe(program: &'static str, args: &'static [&'static str]) -> ToolRecipe {
    ToolRecipe {
        program,
        args,
        output: ToolOutput::Stdout,
    }
}

const SEVEN_ZIP: ToolRecipe = dest_recipe("7z", &["x", "-y", "-o{dest}", "{archive}"]);
const BSDTAR: ToolRecipe = dest_recipe("bsdtar", &["-xf", "{archive}", "-C", "{dest}"]);
const UNAR: ToolRecipe = dest_recipe("unar", &["-q", "-f", "-o", "{dest}", "{archive}"]);

const ZIP_TOOLS: &[ToolRecipe] = &[
    dest_recipe("unzip", &["-o", "-qq", "{archive}", "-d", "{dest}"]),
    SEVEN_ZIP,
    BSDTAR,
];
const RAR_TOOLS: &[ToolRecipe] = &[
    dest_recipe("unrar", &["x", "-o+", "-y", "-idq", "{archive}", "{dest}/"]),
    SEVEN_ZIP,
    UNAR,
    BSDTAR,
];
const SEVEN_ZIP_TOOLS: &[ToolRecipe] = &[
    SEVEN_ZIP,
    dest_recipe("7za", &["x", "-y", "-o{dest}", "{archive}"]),
    dest_recipe("7zr", &["x", "-y", "-o{dest}", "{archive}"]),
    UNAR,
];
const TAR_TOOLS: &[ToolRecipe] = &[
    dest_recipe("tar", &["-xf", "{archive}", "-C", "{dest}"]),
    BSDTAR,
    SEVEN_ZIP,
];
const TAR_GZ_TOOLS: &[ToolRecipe] = &[
    dest_recipe("tar", &["-xzf", "{archive}", "-C", "{dest}"]),
    BSDTAR,
];
const TAR_BZ2_TOOLS: &[ToolRecipe] = &[
    dest_recipe("tar", &["-xjf", "{archive}", "-C", "{dest}"]),
    BSDTAR,
];
const TAR_XZ_TOOLS: &[ToolRecipe] = &[
    dest_recipe("tar", &["-xJf", "{archive}", "-C", "{dest}"]),
    BSDTAR,
];
const GZ_TOOLS: &[ToolRecipe] = &[stdout_recipe("gzip", &["-dc", "{archive}"]), SEVEN_ZIP];
const BZ2_TOOLS: &[ToolRecipe] = &[stdout_recipe("bzip2", &["-dc", "{archive}"]), SEVEN_ZIP];
const XZ_TOOLS: &[ToolRecipe] = &[stdout_recipe("xz", &["-dc", "{archive}"]), SEVEN_ZIP];

/// Format database: which commands can unpack this archive, best first.
fn recipes_for(archive: &Path, format: ArchiveFormat) -> &'static [ToolRecipe] {
    let tarball = format.is_compressed_tarball(archive);
    match format {
        ArchiveFormat::Zip => ZIP_TOOLS,
        ArchiveFormat::Rar => RAR_TOOLS,
        ArchiveFormat::SevenZip => SEVEN_ZIP_TOOLS,
        ArchiveFormat::Tar => TAR_TOOLS,
        ArchiveFormat::Gz if tarball => TAR_GZ_TOOLS,
        ArchiveFormat::Bz2 if tarball => TAR_BZ2_TOOLS,
        ArchiveFormat::Xz if tarball => TAR_XZ_TOOLS,
        ArchiveFormat::Gz => GZ_TOOLS,
        ArchiveFormat::Bz2 => BZ2_TOOLS,
        ArchiveFormat::Xz => XZ_TOOLS,
    }
}

fn expand_args(recipe: &ToolRecipe, archive: &Path, dest: &Path) -> Vec<OsString> {
    recipe
        .args
        .iter()
        .map(|arg| {
            if *arg == "{archive}" {
                return archive.as_os_str().to_os_string();
            }
            match arg.split_once("{dest}") {
                Some((before, after)) => {
                    let mut s = OsString::from(before);
                    s.push(dest.as_os_str());
                    s.push(after);
                    s
                }
                None => OsString::from(arg),
            }
        })
        .collect()
}

/// Drives the external archive tools listed in the format database.
pub struct ToolExtractor {
    timeout: Option<Duration>,
}

impl ToolExtractor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ExtractBackend for ToolExtractor {
    fn name(&self) -> &'static str {
        "tools"
    }

    async fn extract(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        dest: &Path,
    ) -> Result<(), BackendError> {
        let recipes = recipes_for(archive, format);
        let mut last_failure: Option<BackendError> = None;

        for recipe in recipes {
            let args = expand_args(recipe, archive, dest);
            match run_tool(Path::new(recipe.program), &args, self.timeout, &[]).await {
                Ok(output) => {
                    if recipe.output == ToolOutput::Stdout {
                        let target = dest.join(decompressed_name(archive));
                        tokio::fs::write(&target, &output.stdout).await?;
                    }
                    debug!("{} unpacked {}", recipe.program, archive.display());
                    return Ok(());
                }
                Err(e) if e.is_unavailable() => debug!("{} not installed", recipe.program),
                Err(e) => {
                    debug!("{} failed on {}: {}", recipe.program, archive.display(), e);
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| BackendError::Unavailable {
            backend: "tools".into(),
            reason: format!(
                "none of {} is installed",
                recipes
                    .iter()
                    .map(|r| r.program)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, name: &str, data: &[u8]) {
        let file = File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    struct Scripted {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExtractBackend for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn extract(
            &self,
            _archive: &Path,
            _format: ArchiveFormat,
            dest: &Path,
        ) -> Result<(), BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::failed(self.name, "corrupt"));
            }
            std::fs::write(dest.join("from-fallback.txt"), b"ok")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn native_zip_extracts_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &[("a.pdf", b"%PDF-a"), ("sub/b.docx", b"docx")]);
        let dest = dir.path().join("out");

        let extractor = ArchiveExtractor::new(vec![Arc::new(NativeExtractor)]);
        let backend = extractor.extract(&archive, &dest).await.unwrap();

        assert_eq!(backend, "native");
        assert_eq!(std::fs::read(dest.join("a.pdf")).unwrap(), b"%PDF-a");
        assert_eq!(std::fs::read(dest.join("sub/b.docx")).unwrap(), b"docx");
    }

    #[tokio::test]
    async fn native_tar_gz_and_plain_gz() {
        let dir = tempfile::tempdir().unwrap();
        let tgz = dir.path().join("src.tar.gz");
        write_tar_gz(&tgz, "inner/report.doc", b"doc");
        let plain = dir.path().join("notes.pdf.gz");
        {
            let mut gz = flate2::write::GzEncoder::new(
                File::create(&plain).unwrap(),
                flate2::Compression::default(),
            );
            gz.write_all(b"%PDF-notes").unwrap();
            gz.finish().unwrap();
        }

        let extractor = ArchiveExtractor::new(vec![Arc::new(NativeExtractor)]);
        let out1 = dir.path().join("x1");
        let out2 = dir.path().join("x2");
        extractor.extract(&tgz, &out1).await.unwrap();
        extractor.extract(&plain, &out2).await.unwrap();

        assert_eq!(std::fs::read(out1.join("inner/report.doc")).unwrap(), b"doc");
        assert_eq!(std::fs::read(out2.join("notes.pdf")).unwrap(), b"%PDF-notes");
    }

    #[tokio::test]
    async fn native_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.tar");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            for (name, data) in [("deck.pptx", &b"pptx"[..]), ("docs/a.pdf", &b"%PDF-a"[..])] {
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, name, data).unwrap();
            }
            builder.finish().unwrap();
        }
        let dest = dir.path().join("out");

        let extractor = ArchiveExtractor::new(vec![Arc::new(NativeExtractor)]);
        let backend = extractor.extract(&archive, &dest).await.unwrap();

        assert_eq!(backend, "native");
        assert_eq!(std::fs::read(dest.join("deck.pptx")).unwrap(), b"pptx");
        assert_eq!(std::fs::read(dest.join("docs/a.pdf")).unwrap(), b"%PDF-a");
    }

    #[tokio::test]
    async fn native_rejects_rar_as_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let rar = dir.path().join("a.rar");
        std::fs::write(&rar, b"Rar!").unwrap();
        let err = NativeExtractor
            .extract(&rar, ArchiveFormat::Rar, dir.path())
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "got: {err}");
    }

    #[tokio::test]
    async fn falls_back_to_second_backend() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.7z");
        std::fs::write(&archive, b"not really 7z").unwrap();
        let first = Arc::new(Scripted {
            name: "first",
            fail: true,
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(Scripted {
            name: "second",
            fail: false,
            calls: AtomicUsize::new(0),
        });
        let extractor = ArchiveExtractor::new(vec![first.clone(), second.clone()]);

        let dest = dir.path().join("dest");
        let backend = extractor.extract(&archive, &dest).await.unwrap();

        assert_eq!(backend, "second");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert!(dest.join("from-fallback.txt").exists());
    }

    #[tokio::test]
    async fn all_backends_failing_reports_every_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"garbage").unwrap();
        let failing = |name| {
            Arc::new(Scripted {
                name,
                fail: true,
                calls: AtomicUsize::new(0),
            }) as Arc<dyn ExtractBackend>
        };
        let extractor = ArchiveExtractor::new(vec![failing("a"), failing("b")]);

        match extractor.extract(&archive, &dir.path().join("d")).await {
            Err(DocMergeError::ExtractionFailed { attempts, .. }) => {
                let names: Vec<_> = attempts.iter().map(|a| a.backend.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_archive_is_rejected_without_trying_backends() {
        let extractor = ArchiveExtractor::new(vec![]);
        let err = extractor
            .extract(Path::new("notes.pdf"), Path::new("/tmp/never"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocMergeError::NotAnArchive { .. }));
    }

    #[test]
    fn format_database_covers_every_format() {
        for (name, format) in [
            ("a.zip", ArchiveFormat::Zip),
            ("a.rar", ArchiveFormat::Rar),
            ("a.7z", ArchiveFormat::SevenZip),
            ("a.tar", ArchiveFormat::Tar),
            ("a.gz", ArchiveFormat::Gz),
            ("a.tar.bz2", ArchiveFormat::Bz2),
            ("a.xz", ArchiveFormat::Xz),
        ] {
            assert!(!recipes_for(Path::new(name), format).is_empty(), "{name}");
        }
        assert_eq!(recipes_for(Path::new("a.tar.gz"), ArchiveFormat::Gz)[0].program, "tar");
        assert_eq!(recipes_for(Path::new("a.gz"), ArchiveFormat::Gz)[0].program, "gzip");
    }

    #[test]
    fn expand_args_substitutes_placeholders() {
        let args = expand_args(&SEVEN_ZIP, Path::new("/in/a.7z"), Path::new("/out"));
        assert_eq!(
            args,
            vec![
                OsString::from("x"),
                OsString::from("-y"),
                OsString::from("-o/out"),
                OsString::from("/in/a.7z"),
            ]
        );
    }
}
