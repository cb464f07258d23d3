//! Input resolution: validate a path and work out what kind of document it is.
//!
//! Routing needs three facts before any backend runs: the file exists and is
//! readable, its size in bytes, and its content type. The declared type wins
//! when the caller supplies one; otherwise the extension decides.
//!
//! Format gates for each backend live here too, so both backends and the
//! selector agree on what counts as "supported".

use crate::error::DocnormError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_PNG: &str = "image/png";
pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_TIFF: &str = "image/tiff";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_UNKNOWN: &str = "application/octet-stream";

/// Content types the cloud OCR service accepts. `image/jpg` is not a
/// registered type but clients send it.
const CLOUD_MIME_TYPES: &[&str] = &[MIME_PDF, MIME_PNG, MIME_JPEG, "image/jpg", MIME_TIFF];

const CLOUD_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tiff", "tif"];

/// Human-readable list used in unsupported-format errors.
pub const CLOUD_SUPPORTED: &str = "PDF, PNG, JPG, TIFF";

/// Human-readable list for the local backend.
pub const LOCAL_SUPPORTED: &str = "PDF, TXT, MD";

/// A validated input file.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    /// Base name, e.g. `report.pdf`.
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// What the local backend can do with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    Pdf,
    /// Plain text or markdown, chunked directly.
    Markdown,
    Unsupported,
}

/// Validate `path` and resolve its content type.
///
/// `declared` is the caller's content type; when `None` or empty it is
/// guessed from the extension.
pub fn resolve(path: &Path, declared: Option<&str>) -> Result<InputFile, DocnormError> {
    let meta = std::fs::metadata(path).map_err(|e| io_error(path, e))?;
    if !meta.is_file() {
        return Err(DocnormError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    // Metadata succeeds on unreadable files; opening does not.
    std::fs::File::open(path).map_err(|e| io_error(path, e))?;

    let content_type = match declared.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => d.to_ascii_lowercase(),
        None => guess_content_type(path).to_string(),
    };

    let input = InputFile {
        path: path.to_path_buf(),
        file_name: file_name(path),
        content_type,
        size_bytes: meta.len(),
    };
    debug!(
        "Resolved input: {} ({}, {} bytes)",
        input.path.display(),
        input.content_type,
        input.size_bytes
    );
    Ok(input)
}

fn io_error(path: &Path, e: std::io::Error) -> DocnormError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => DocnormError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DocnormError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

/// Base name of a path, or the whole path when it has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Content type from the file extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "pdf" => MIME_PDF,
        "png" => MIME_PNG,
        "jpg" | "jpeg" => MIME_JPEG,
        "tif" | "tiff" => MIME_TIFF,
        "txt" | "text" => MIME_TEXT,
        "md" | "markdown" => MIME_MARKDOWN,
        _ => MIME_UNKNOWN,
    }
}

/// Whether the cloud OCR service accepts this file, by declared type first
/// and by extension second.
pub fn is_cloud_supported(path: &Path, content_type: &str) -> bool {
    CLOUD_MIME_TYPES.contains(&content_type) || CLOUD_EXTENSIONS.contains(&extension(path).as_str())
}

/// How the local backend should read this file.
pub fn local_kind(path: &Path, content_type: &str) -> LocalKind {
    match content_type {
        MIME_PDF => return LocalKind::Pdf,
        MIME_TEXT | MIME_MARKDOWN | "text/x-markdown" => return LocalKind::Markdown,
        _ => {}
    }
    match extension(path).as_str() {
        "pdf" => LocalKind::Pdf,
        "txt" | "text" | "md" | "markdown" => LocalKind::Markdown,
        _ => LocalKind::Unsupported,
    }
}

/// Check for the `%PDF` magic bytes.
pub fn has_pdf_magic(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| &magic == b"%PDF")
        .unwrap_or(false)
}
