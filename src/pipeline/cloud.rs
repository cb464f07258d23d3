//! Cloud backend: format gate, OCR call, Document assembly.
//!
//! The backend rejects unsupported formats before reading the file, sends
//! the raw bytes to an [`OcrService`] and turns the returned blocks into a
//! Document with [`BlockGraph`]. Tables are only reconstructed in `analyze`
//! mode; `detect` responses carry no TABLE blocks worth reading.
//!
//! Chunk offsets from this backend are local to each page's joined LINE text
//! (`offsetScope = "page"`); the service gives no global positions.

use super::blocks::BlockGraph;
use super::chunk::interleave_tables;
use super::input::{self, InputFile};
use super::textract::{OcrResponse, OcrService};
use crate::config::ApiMode;
use crate::document::{char_len, Chunk, ChunkType, Document, DocumentDraft, OffsetScope, Table};
use crate::error::DocnormError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extractor tag on cloud tables.
pub const TEXTRACT_EXTRACTOR: &str = "textract";

/// The cloud OCR backend.
#[derive(Clone)]
pub struct CloudBackend {
    service: Arc<dyn OcrService>,
    mode: ApiMode,
}

impl std::fmt::Debug for CloudBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudBackend")
            .field("service", &"<dyn OcrService>")
            .field("mode", &self.mode)
            .finish()
    }
}

impl CloudBackend {
    pub fn new(service: Arc<dyn OcrService>, mode: ApiMode) -> Self {
        Self { service, mode }
    }

    /// `textract_detect` or `textract_analyze`.
    pub fn processor_tag(&self) -> String {
        format!("textract_{}", self.mode)
    }

    pub async fn extract(&self, file: &InputFile) -> Result<Document, DocnormError> {
        if !input::is_cloud_supported(&file.path, &file.content_type) {
            warn!(
                "Unsupported format for Textract: {} - {}",
                file.content_type,
                file.path.display()
            );
            return Err(DocnormError::UnsupportedFormat {
                backend: "Textract",
                content_type: file.content_type.clone(),
                supported: input::CLOUD_SUPPORTED,
            });
        }

        let bytes = tokio::fs::read(&file.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                DocnormError::PermissionDenied {
                    path: file.path.clone(),
                }
            } else {
                DocnormError::FileNotFound {
                    path: file.path.clone(),
                }
            }
        })?;

        let start = Instant::now();
        let response = self.service.analyze(&bytes, self.mode).await?;
        info!(
            "Textract {} returned {} blocks in {}ms",
            self.mode,
            response.blocks.len(),
            start.elapsed().as_millis()
        );

        Ok(self.assemble(file, &response))
    }

    fn assemble(&self, file: &InputFile, response: &OcrResponse) -> Document {
        let graph = BlockGraph::new(&response.blocks);

        let tables: Vec<Table> = match self.mode {
            ApiMode::Analyze => graph
                .tables()
                .into_iter()
                .map(|parsed| {
                    let table = Table::new(
                        format!("table-{}", parsed.ordinal),
                        format!("Table {}", parsed.ordinal + 1),
                        parsed.grid.headers,
                        parsed.grid.rows,
                        TEXTRACT_EXTRACTOR,
                    )
                    .with_confidence(parsed.confidence);
                    match parsed.page {
                        Some(page) => table.on_page(page),
                        None => table,
                    }
                })
                .collect(),
            ApiMode::Detect => Vec::new(),
        };
        debug!("Reconstructed {} tables from blocks", tables.len());

        let page_chunks: Vec<Chunk> = graph
            .page_texts()
            .into_iter()
            .map(|(page, text)| {
                Chunk::new(0, ChunkType::Paragraph, text.trim(), 0, char_len(&text))
                    .with_meta("pageNumber", page)
                    .with_meta("source", TEXTRACT_EXTRACTOR)
                    .with_scope(OffsetScope::Page)
            })
            .collect();

        let language = response
            .document_metadata
            .as_ref()
            .and_then(|m| m.language.clone());

        DocumentDraft {
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            processor: self.processor_tag(),
            content: graph.full_text(),
            chunks: interleave_tables(page_chunks, &tables),
            tables,
            page_count: graph.page_count(),
            language,
        }
        .into_document()
    }
}
