//! File classification by name suffix.
//!
//! Classification is purely by extension, compared case-insensitively. No
//! magic bytes are read: a `.zip` that is really a text file is still an
//! archive here and simply fails to extract later.

use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Archive suffixes we attempt to unpack.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"];

/// Document suffixes we attempt to convert.
pub const DOCUMENT_EXTENSIONS: &[&str] = &["doc", "docx", "pdf", "ppt", "pptx", "xls", "xlsx"];

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// A recognised archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Rar,
    SevenZip,
    Tar,
    Gz,
    Bz2,
    Xz,
}

impl ArchiveFormat {
    /// Classify `path` by suffix. Returns `None` for anything outside the
    /// allow-list.
    pub fn from_path(path: &Path) -> Option<Self> {
        match lowercase_extension(path)?.as_str() {
            "zip" => Some(Self::Zip),
            "rar" => Some(Self::Rar),
            "7z" => Some(Self::SevenZip),
            "tar" => Some(Self::Tar),
            "gz" => Some(Self::Gz),
            "bz2" => Some(Self::Bz2),
            "xz" => Some(Self::Xz),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
            Self::SevenZip => "7z",
            Self::Tar => "tar",
            Self::Gz => "gz",
            Self::Bz2 => "bz2",
            Self::Xz => "xz",
        }
    }

    /// Single-stream compressors wrap exactly one file.
    pub fn is_stream_compressor(&self) -> bool {
        matches!(self, Self::Gz | Self::Bz2 | Self::Xz)
    }

    /// `true` for `name.tar.gz`, `name.tar.bz2`, `name.tar.xz`.
    pub fn is_compressed_tarball(&self, path: &Path) -> bool {
        self.is_stream_compressor()
            && path
                .file_stem()
                .map(Path::new)
                .and_then(lowercase_extension)
                .is_some_and(|inner| inner == "tar")
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A document family; each family has its own conversion chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// doc, docx
    Word,
    /// ppt, pptx
    Presentation,
    /// xls, xlsx
    Spreadsheet,
    /// pdf, copied as-is
    Pdf,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match lowercase_extension(path)?.as_str() {
            "doc" | "docx" => Some(Self::Word),
            "ppt" | "pptx" => Some(Self::Presentation),
            "xls" | "xlsx" => Some(Self::Spreadsheet),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Word => "word",
            Self::Presentation => "presentation",
            Self::Spreadsheet => "spreadsheet",
            Self::Pdf => "pdf",
        };
        f.write_str(s)
    }
}

pub fn is_archive(path: &Path) -> bool {
    ArchiveFormat::from_path(path).is_some()
}

pub fn is_document(path: &Path) -> bool {
    DocumentKind::from_path(path).is_some()
}
