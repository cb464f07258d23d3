//! # docnorm
//!
//! Extract text and tables from documents and normalise them into one
//! chunked record, whichever backend did the extraction.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Input    validate path, size and content type
//!  ├─ 2. Route    cloud OCR if enabled and within limits, else local
//!  ├─ 3a. Cloud   Textract blocks → lines, pages, tables
//!  ├─ 3b. Local   pdfium text + built-in tables, grid tables, merge
//!  ├─ 4. Chunk    per-page paragraphs and one chunk per table
//!  └─ 5. Output   a Document; failures become error Documents
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docnorm::{DocumentProcessor, ProcessorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Local-only by default; enable the cloud with `.cloud_enabled(true)`
//!     let processor = DocumentProcessor::new(ProcessorConfig::default());
//!     let doc = processor.process("report.pdf", None).await;
//!     if doc.success {
//!         println!("{} chunks, {} tables", doc.chunks.len(), doc.tables.len());
//!     } else {
//!         eprintln!("{}", doc.error.unwrap_or_default());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Offsets
//!
//! `startIndex`/`endIndex` depend on the backend and every chunk says which
//! applies in `metadata.offsetScope`: `document` for local extraction and
//! chunked markdown, `page` for cloud pages, `table` for table chunks.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docnorm` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docnorm = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ApiMode, ProcessorConfig, ProcessorConfigBuilder};
pub use document::{Chunk, ChunkType, Document, DocumentMetadata, Layout, OffsetScope, Table};
pub use error::{DocnormError, ErrorKind};
pub use pipeline::chunk::Chunker;
pub use pipeline::local::{merge_tables, LocalBackend};
pub use pipeline::pdfium::{PageContent, PageReader, PdfiumGridReader, PdfiumTextReader};
pub use pipeline::textract::{OcrResponse, OcrService, TextractClient};
pub use process::{Backend, DocumentProcessor, Route};
pub use store::{DocumentStore, DocumentSummary, MemoryDocumentStore, StoreStats};
