//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_docmerge::{BackendError, ConvertBackend};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::{Cursor, Write};
use std::path::Path;

/// Write a one-page PDF whose content stream shows `label`.
pub fn write_labeled_pdf(path: &Path, label: &str) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = format!("BT /F1 24 Tf 72 720 Td ({label}) Tj ET");
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let mut page = Dictionary::new();
    page.set("Type", Object::Name(b"Page".to_vec()));
    page.set("Parent", Object::Reference(pages_id));
    page.set("Contents", Object::Reference(content_id));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ]),
    );
    let page_id = doc.add_object(page);

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    pages.set("Count", Object::Integer(1));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    doc.save(path).unwrap();
}

/// Content stream of every page, in page order.
pub fn page_contents(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).to_string())
        .collect()
}

/// The `(label)` shown on each page, in page order.
pub fn page_labels(path: &Path) -> Vec<String> {
    page_contents(path)
        .iter()
        .map(|content| {
            let start = content.find('(').map(|i| i + 1).unwrap_or(0);
            let end = content.rfind(')').unwrap_or(content.len());
            content[start..end].to_string()
        })
        .collect()
}

/// In-memory zip with the given entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Stand-in for an office converter: emits a one-page PDF labelled with the
/// source file stem.
pub struct LabelConverter;

#[async_trait]
impl ConvertBackend for LabelConverter {
    fn name(&self) -> &'static str {
        "label"
    }

    async fn convert(&self, source: &Path, output: &Path) -> Result<(), BackendError> {
        let label = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        write_labeled_pdf(output, &label);
        Ok(())
    }
}

/// A converter that always fails.
pub struct BrokenConverter;

#[async_trait]
impl ConvertBackend for BrokenConverter {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn convert(&self, _source: &Path, _output: &Path) -> Result<(), BackendError> {
        Err(BackendError::failed("broken", "could not open document"))
    }
}
