//! Recursive unpacking: flatten nested archives into plain files.
//!
//! ## Traversal
//!
//! A depth-first work stack. For each directory the whole subtree is walked
//! and every archive collected *before* anything is extracted, so extraction
//! never mutates a tree that is still being walked. Each archive lands in
//! `<scratch>/extracted/extract_<stem>/`, and that directory is unpacked in
//! full before the next sibling archive is touched. Same-named archives share
//! a destination, so an inner archive from the first one must be flattened
//! before the second one overwrites it. The loop ends when the stack is empty.
//!
//! ## Guards
//!
//! * visited set: an archive is extracted at most once per run for a given
//!   path *and* content, which stops `a.zip` containing `a.zip` from looping
//!   forever while still unpacking a different archive that later lands on
//!   the same path;
//! * depth limit: [`crate::PipelineConfig::max_archive_depth`] caps the
//!   nesting level. Archives beyond it are reported, not extracted.

use crate::kind::is_archive;
use crate::output::{ExtractedArchive, ItemFailure, UnpackReport};
use crate::pipeline::extract::ArchiveExtractor;
use crate::pipeline::RunContext;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Canonical path plus content fingerprint of one archive.
type VisitKey = (PathBuf, Option<u64>);

/// Unpack every archive under `root`, recursively, into the workspace.
pub async fn unpack_tree(
    ctx: &RunContext<'_>,
    extractor: &ArchiveExtractor,
    root: &Path,
) -> UnpackReport {
    let extract_root = ctx.workspace.extract_root();
    let mut report = UnpackReport::default();
    let mut visited: HashSet<VisitKey> = HashSet::new();
    // Each frame: archives still pending in one directory, and their depth.
    let mut stack: Vec<(VecDeque<PathBuf>, usize)> = Vec::new();
    push_level(&mut stack, root, 1);

    while let Some((pending, depth)) = stack.last_mut() {
        let depth = *depth;
        let Some(archive) = pending.pop_front() else {
            stack.pop();
            continue;
        };

        if !visited.insert(visit_key(&archive)) {
            debug!("Already extracted, skipping: {}", archive.display());
            continue;
        }

        if ctx.config.max_archive_depth.is_some_and(|max| depth > max) {
            warn!(
                "Not extracting {}: nesting depth {} exceeds the limit",
                archive.display(),
                depth
            );
            ctx.progress
                .on_archive_failed(&archive, "nesting depth limit reached");
            report.depth_limited.push(archive);
            continue;
        }

        let dest = extract_destination(&extract_root, &archive);
        match extractor.extract(&archive, &dest).await {
            Ok(backend) => {
                ctx.progress.on_archive_extracted(&archive, &dest, backend);
                report.extracted.push(ExtractedArchive {
                    archive,
                    destination: dest.clone(),
                    backend: backend.to_string(),
                    depth,
                });
                push_level(&mut stack, &dest, depth + 1);
            }
            Err(e) => {
                warn!("{}", e);
                ctx.progress.on_archive_failed(&archive, &e.to_string());
                report.failed.push(ItemFailure {
                    path: archive,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Unpacking finished: {} extracted, {} failed, {} over depth limit",
        report.extracted.len(),
        report.failed.len(),
        report.depth_limited.len()
    );
    report
}

fn push_level(stack: &mut Vec<(VecDeque<PathBuf>, usize)>, dir: &Path, depth: usize) {
    let archives = collect_archives(dir);
    if archives.is_empty() {
        debug!("No archives under {}", dir.display());
        return;
    }
    debug!(
        "Found {} archive(s) under {} at depth {}",
        archives.len(),
        dir.display(),
        depth
    );
    stack.push((archives.into(), depth));
}

fn visit_key(archive: &Path) -> VisitKey {
    let path = std::fs::canonicalize(archive).unwrap_or_else(|_| archive.to_path_buf());
    (path, content_fingerprint(archive).ok())
}

/// Streaming hash of the file bytes.
fn content_fingerprint(path: &Path) -> std::io::Result<u64> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = DefaultHasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.write(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Every archive anywhere under `dir`, in file-name-sorted walk order.
pub fn collect_archives(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_archive(e.path()))
        .map(|e| e.into_path())
        .collect()
}

/// `<root>/extract_<stem>`. Same-named archives share a destination.
pub fn extract_destination(root: &Path, archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    root.join(format!("extract_{stem}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::workspace::Workspace;
    use std::io::{Cursor, Write};

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn setup(depth: Option<usize>) -> (tempfile::TempDir, PathBuf, PipelineConfig) {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        let config = PipelineConfig::builder()
            .scratch_parent(root.path().join("tmp"))
            .output_dir(root.path().join("output"))
            .max_archive_depth(depth)
            .build()
            .unwrap();
        (root, input, config)
    }

    fn files_under(dir: &Path) -> Vec<String> {
        WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[tokio::test]
    async fn single_archive_yields_exactly_its_contents() {
        let (_root, input, config) = setup(Some(32));
        std::fs::write(
            input.join("data.zip"),
            zip_bytes(&[("slide.pptx", b"pptx"), ("docs/a.pdf", b"%PDF")]),
        )
        .unwrap();
        let ws = Workspace::acquire(&config).unwrap();
        let ctx = RunContext::new(&config, &ws);

        let report = unpack_tree(&ctx, &ArchiveExtractor::from_config(&config), &input).await;

        assert_eq!(report.extracted.len(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(
            files_under(&ws.extract_root()),
            vec!["extract_data/docs/a.pdf", "extract_data/slide.pptx"]
        );
    }

    #[tokio::test]
    async fn nested_archives_reach_the_innermost_document() {
        let (_root, input, config) = setup(Some(32));
        let innermost = zip_bytes(&[("deep.docx", b"docx")]);
        let middle = zip_bytes(&[("inner.zip", &innermost)]);
        std::fs::write(input.join("outer.zip"), zip_bytes(&[("middle.zip", &middle)])).unwrap();
        let ws = Workspace::acquire(&config).unwrap();
        let ctx = RunContext::new(&config, &ws);

        let report = unpack_tree(&ctx, &ArchiveExtractor::from_config(&config), &input).await;

        let depths: Vec<_> = report.extracted.iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![1, 2, 3]);
        let leaf = ws.extract_root().join("extract_inner");
        assert!(leaf.join("deep.docx").is_file());

        // Unpacking the flattened leaf again finds nothing further.
        assert!(collect_archives(&leaf).is_empty());
        let again = unpack_tree(&ctx, &ArchiveExtractor::from_config(&config), &leaf).await;
        assert_eq!(again.archives_seen(), 0);
    }

    #[tokio::test]
    async fn self_referential_archive_terminates() {
        let (_root, input, config) = setup(None);
        let inner = zip_bytes(&[("doc.pdf", b"%PDF")]);
        std::fs::write(input.join("a.zip"), zip_bytes(&[("a.zip", &inner)])).unwrap();
        let ws = Workspace::acquire(&config).unwrap();
        let ctx = RunContext::new(&config, &ws);

        let report = unpack_tree(&ctx, &ArchiveExtractor::from_config(&config), &input).await;

        assert_eq!(report.extracted.len(), 2);
        assert!(ws.extract_root().join("extract_a/doc.pdf").is_file());
    }

    #[tokio::test]
    async fn same_named_archives_keep_both_nested_documents() {
        let (_root, input, config) = setup(Some(32));
        std::fs::create_dir_all(input.join("a")).unwrap();
        std::fs::create_dir_all(input.join("b")).unwrap();
        let inner_a = zip_bytes(&[("from_a.pdf", b"%PDF a")]);
        let inner_b = zip_bytes(&[("from_b.pdf", b"%PDF b")]);
        std::fs::write(input.join("a/data.zip"), zip_bytes(&[("inner.zip", &inner_a)])).unwrap();
        std::fs::write(input.join("b/data.zip"), zip_bytes(&[("inner.zip", &inner_b)])).unwrap();
        let ws = Workspace::acquire(&config).unwrap();
        let ctx = RunContext::new(&config, &ws);

        let report = unpack_tree(&ctx, &ArchiveExtractor::from_config(&config), &input).await;

        assert_eq!(report.extracted.len(), 4);
        let depths: Vec<_> = report.extracted.iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![1, 2, 1, 2]);
        let leaf = ws.extract_root().join("extract_inner");
        assert!(leaf.join("from_a.pdf").is_file(), "first archive's document lost");
        assert!(leaf.join("from_b.pdf").is_file());
    }

    #[test]
    fn fingerprint_follows_content() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("inner.zip");
        std::fs::write(&p, b"one").unwrap();
        let first = visit_key(&p);
        assert_eq!(visit_key(&p), first);
        std::fs::write(&p, b"two").unwrap();
        assert_ne!(visit_key(&p), first);
    }

    #[tokio::test]
    async fn depth_limit_stops_descent() {
        let (_root, input, config) = setup(Some(1));
        let inner = zip_bytes(&[("deep.docx", b"docx")]);
        std::fs::write(input.join("outer.zip"), zip_bytes(&[("inner.zip", &inner)])).unwrap();
        let ws = Workspace::acquire(&config).unwrap();
        let ctx = RunContext::new(&config, &ws);

        let report = unpack_tree(&ctx, &ArchiveExtractor::from_config(&config), &input).await;

        assert_eq!(report.extracted.len(), 1);
        assert_eq!(report.depth_limited.len(), 1);
        assert!(!ws.extract_root().join("extract_inner").exists());
    }

    #[tokio::test]
    async fn corrupt_archive_is_recorded_and_walk_continues() {
        let (_root, input, config) = setup(Some(32));
        std::fs::write(input.join("a-broken.zip"), b"this is not a zip").unwrap();
        std::fs::write(input.join("b-good.zip"), zip_bytes(&[("x.pdf", b"%PDF")])).unwrap();
        let ws = Workspace::acquire(&config).unwrap();
        let ctx = RunContext::new(&config, &ws);
        // Native only: the outcome must not depend on which tools are installed.
        let extractor =
            ArchiveExtractor::new(vec![std::sync::Arc::new(crate::pipeline::extract::NativeExtractor)]);

        let report = unpack_tree(&ctx, &extractor, &input).await;

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].path.ends_with("a-broken.zip"));
        assert_eq!(report.extracted.len(), 1);
        assert!(ws.extract_root().join("extract_b-good/x.pdf").is_file());
    }

    #[test]
    fn collect_is_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("z/deeper")).unwrap();
        for p in ["c.7z", "a.zip", "z/deeper/b.rar", "notes.pdf"] {
            File::create(dir.path().join(p)).unwrap();
        }
        let found: Vec<_> = collect_archives(dir.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(found, vec!["a.zip", "c.7z", "b.rar"]);
    }

    #[test]
    fn destination_is_named_after_the_stem() {
        let root = Path::new("/scratch/extracted");
        assert_eq!(
            extract_destination(root, Path::new("/in/data.zip")),
            root.join("extract_data")
        );
        assert_eq!(
            extract_destination(root, Path::new("/in/src.tar.gz")),
            root.join("extract_src.tar")
        );
    }
}
