//! Error types for the docnorm library.
//!
//! A single error type, [`DocnormError`], describes every way a backend call
//! can fail. It never escapes the public `process*` entry points: the
//! [`crate::process::DocumentProcessor`] turns terminal errors into an error
//! [`crate::document::Document`] so callers always receive a well-formed
//! record.
//!
//! Each variant maps onto a coarse [`ErrorKind`], which the processor logs
//! alongside every fallback and terminal failure. Any cloud error triggers
//! the fallback regardless of kind.
//! Backend *ineligibility* (size or page limits, cloud disabled) is a routing
//! decision and has no representation here.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while extracting a document.
#[derive(Debug, Error)]
pub enum DocnormError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The backend does not accept this content type / extension.
    #[error("Format not supported by {backend}: {content_type}. Supported: {supported}")]
    UnsupportedFormat {
        backend: &'static str,
        content_type: String,
        supported: &'static str,
    },

    // ── Cloud OCR errors ──────────────────────────────────────────────────
    /// The OCR service answered with a structured error.
    #[error("Textract API error: {code} - {message}")]
    CloudApi { code: String, message: String },

    /// The request never produced a usable response (DNS, TLS, reset, bad body).
    #[error("Textract request failed: {0}")]
    CloudTransport(String),

    /// The OCR call exceeded the configured timeout.
    #[error("Textract call timed out after {secs}s")]
    CloudTimeout { secs: u64 },

    /// No access key / secret key could be resolved for request signing.
    #[error("Cloud credentials are not configured (set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY)")]
    CredentialsMissing,

    // ── Local extraction errors ───────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt or the file is not a PDF.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// A page reader failed part-way through a document.
    #[error("{extractor} failed on page {page}: {detail}")]
    LocalExtraction {
        extractor: &'static str,
        page: usize,
        detail: String,
    },

    // ── Routing errors ────────────────────────────────────────────────────
    /// Both backends are disabled or failed to initialise.
    #[error("No document processor available (cloud OCR disabled and local fallback unavailable)")]
    NoProcessorAvailable,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`DocnormError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The file cannot be read at all.
    Input,
    /// Rejected before any backend call was made.
    UnsupportedFormat,
    /// Network, service or library failure during extraction.
    BackendFailure,
    /// Neither backend can run.
    NoBackend,
    /// Invalid configuration.
    Config,
    /// Anything else.
    Internal,
}

impl DocnormError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocnormError::FileNotFound { .. } | DocnormError::PermissionDenied { .. } => {
                ErrorKind::Input
            }
            DocnormError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            DocnormError::CloudApi { .. }
            | DocnormError::CloudTransport(_)
            | DocnormError::CloudTimeout { .. }
            | DocnormError::CredentialsMissing
            | DocnormError::CorruptPdf { .. }
            | DocnormError::PdfiumBindingFailed(_)
            | DocnormError::LocalExtraction { .. } => ErrorKind::BackendFailure,
            DocnormError::NoProcessorAvailable => ErrorKind::NoBackend,
            DocnormError::InvalidConfig(_) => ErrorKind::Config,
            DocnormError::OutputWriteFailed { .. } | DocnormError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}
