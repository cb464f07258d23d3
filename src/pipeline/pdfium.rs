//! Page readers backed by pdfium.
//!
//! Two readers share the [`PageReader`] seam:
//!
//! - [`PdfiumTextReader`] is the general-purpose extractor. It returns each
//!   page's plain text plus whatever tables can be recovered from
//!   column-aligned lines in that text.
//! - [`PdfiumGridReader`] is the specialised table extractor. It ignores the
//!   plain text and reconstructs tables from positioned text segments with a
//!   [`GridDetector`].
//!
//! pdfium is a blocking C library, so every read runs inside
//! `spawn_blocking` and binds its own library handle.

use super::tables::{detect_text_tables, GridDetector, RawGrid, TextSpan};
use crate::error::DocnormError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Minimum rows for a whitespace-aligned table in plain text.
const TEXT_TABLE_MIN_ROWS: usize = 2;

/// What a reader extracted from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    /// 1-based page number.
    pub number: usize,
    pub text: String,
    pub tables: Vec<RawGrid>,
}

/// Reads a PDF page by page.
#[async_trait]
pub trait PageReader: Send + Sync {
    /// Short extractor name used in logs and table metadata.
    fn name(&self) -> &'static str;

    async fn read(&self, path: &Path) -> Result<Vec<PageContent>, DocnormError>;
}

// ── Binding ──────────────────────────────────────────────────────────────────

/// Bind to pdfium.
///
/// Resolution order: `lib_path`, then `$PDFIUM_LIB_PATH`, then the system
/// library. A directory is expanded to the platform library name inside it.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, DocnormError> {
    let explicit = lib_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

    let bindings = match explicit {
        Some(p) => {
            let file = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            debug!("Binding pdfium from {}", file.display());
            Pdfium::bind_to_library(&file).or_else(|_| Pdfium::bind_to_system_library())
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocnormError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, DocnormError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| DocnormError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

async fn run_blocking<F>(name: &'static str, f: F) -> Result<Vec<PageContent>, DocnormError>
where
    F: FnOnce() -> Result<Vec<PageContent>, DocnormError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocnormError::Internal(format!("{} task panicked: {}", name, e)))?
}

// ── Text reader ──────────────────────────────────────────────────────────────

/// Plain text per page, plus tables found in whitespace-aligned lines.
#[derive(Debug, Clone, Default)]
pub struct PdfiumTextReader {
    lib_path: Option<PathBuf>,
}

impl PdfiumTextReader {
    pub const NAME: &'static str = "pdfium_text";

    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }
}

#[async_trait]
impl PageReader for PdfiumTextReader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn read(&self, path: &Path) -> Result<Vec<PageContent>, DocnormError> {
        let path = path.to_path_buf();
        let lib_path = self.lib_path.clone();
        run_blocking(Self::NAME, move || read_text_blocking(&path, lib_path.as_deref())).await
    }
}

fn read_text_blocking(path: &Path, lib_path: Option<&Path>) -> Result<Vec<PageContent>, DocnormError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = open_document(&pdfium, path)?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let number = idx + 1;
        let text = page
            .text()
            .map_err(|e| DocnormError::LocalExtraction {
                extractor: PdfiumTextReader::NAME,
                page: number,
                detail: format!("{:?}", e),
            })?
            .all();
        let tables = detect_text_tables(&text, TEXT_TABLE_MIN_ROWS);
        debug!(
            "Page {}: {} chars, {} text tables",
            number,
            text.len(),
            tables.len()
        );
        pages.push(PageContent {
            number,
            text,
            tables,
        });
    }
    Ok(pages)
}

// ── Grid reader ──────────────────────────────────────────────────────────────

/// Tables reconstructed from positioned text segments.
///
/// Pages come back with empty `text`; only `tables` is meaningful.
#[derive(Debug, Clone, Default)]
pub struct PdfiumGridReader {
    lib_path: Option<PathBuf>,
    detector: GridDetector,
}

impl PdfiumGridReader {
    pub const NAME: &'static str = "pdfium_grid";

    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self {
            lib_path,
            detector: GridDetector::new(),
        }
    }

    pub fn with_detector(mut self, detector: GridDetector) -> Self {
        self.detector = detector;
        self
    }
}

#[async_trait]
impl PageReader for PdfiumGridReader {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn read(&self, path: &Path) -> Result<Vec<PageContent>, DocnormError> {
        let path = path.to_path_buf();
        let lib_path = self.lib_path.clone();
        let detector = self.detector.clone();
        run_blocking(Self::NAME, move || {
            read_grid_blocking(&path, lib_path.as_deref(), &detector)
        })
        .await
    }
}

fn read_grid_blocking(
    path: &Path,
    lib_path: Option<&Path>,
    detector: &GridDetector,
) -> Result<Vec<PageContent>, DocnormError> {
    let pdfium = bind_pdfium(lib_path)?;
    let document = open_document(&pdfium, path)?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let number = idx + 1;
        let text = page.text().map_err(|e| DocnormError::LocalExtraction {
            extractor: PdfiumGridReader::NAME,
            page: number,
            detail: format!("{:?}", e),
        })?;

        let mut spans = Vec::new();
        for seg in text.segments().iter() {
            let t = seg.text();
            if t.trim().is_empty() {
                continue;
            }
            let b = seg.bounds();
            spans.push(TextSpan {
                text: t,
                x: b.left().value,
                y: b.bottom().value,
                width: b.right().value - b.left().value,
                font_size: b.top().value - b.bottom().value,
            });
        }

        let tables = detector.detect(&spans);
        debug!(
            "Page {}: {} segments, {} grid tables",
            number,
            spans.len(),
            tables.len()
        );
        pages.push(PageContent {
            number,
            text: String::new(),
            tables,
        });
    }
    Ok(pages)
}
