//! The unified Document record and its parts.
//!
//! Every backend produces the same shape. Serialisation is camelCase so the
//! JSON written by [`crate::process::DocumentProcessor::process_to_file`] and
//! the CLI matches the contract downstream consumers read:
//!
//! ```text
//! {id, fileName, content, type, metadata{pageCount, wordCount, characterCount,
//!  language}, tables[], layout{hasMultipleColumns, pageCount, sections},
//!  chunks[], processedAt, success, processor, error?}
//! ```
//!
//! Character counts and offsets are measured in Unicode scalar values
//! (`str::chars`), never bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Processor tag of an error Document.
pub const ERROR_PROCESSOR: &str = "error";

/// Language reported when the backend does not detect one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Free-form chunk metadata (page number, table linkage, offset scope).
pub type ChunkMetadata = Map<String, Value>;

/// One processed file.
///
/// Created once per processing call and never mutated afterwards;
/// re-processing a file yields a new `Document` with a new `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub file_name: String,
    /// Full normalized text.
    pub content: String,
    /// Declared content type, e.g. `application/pdf`.
    #[serde(rename = "type")]
    pub content_type: String,
    pub metadata: DocumentMetadata,
    pub tables: Vec<Table>,
    pub layout: Layout,
    pub chunks: Vec<Chunk>,
    pub processed_at: DateTime<Utc>,
    pub success: bool,
    /// Backend tag, e.g. `textract_analyze`, `local_pdfium_tables`, `error`.
    pub processor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub page_count: usize,
    pub word_count: usize,
    pub character_count: usize,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Layout summary. Column detection is not performed, so
/// `has_multiple_columns` is always false and `sections` empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub has_multiple_columns: bool,
    pub page_count: usize,
    pub sections: Vec<String>,
}

/// A retrievable unit of content.
///
/// `start_index`/`end_index` are character offsets. What they point into is
/// recorded in `metadata.offsetScope`: the Document content (`"document"`),
/// one page's text (`"page"`) or the linked table's markdown (`"table"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// `chunk-N`, assigned in emission order from 0.
    pub id: String,
    pub content: String,
    pub start_index: usize,
    pub end_index: usize,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Paragraph,
    Table,
    Error,
}

/// Where a chunk's offsets point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetScope {
    /// Offsets into [`Document::content`].
    Document,
    /// Offsets into the chunk's own page text.
    Page,
    /// Offsets into the linked table's markdown.
    Table,
}

impl OffsetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetScope::Document => "document",
            OffsetScope::Page => "page",
            OffsetScope::Table => "table",
        }
    }
}

/// A reconstructed grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<usize>,
    /// Cloud backend only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Which extractor produced the grid.
    pub extractor: String,
}

impl Table {
    /// Build a table, rendering its markdown from `headers` and `rows`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        extractor: impl Into<String>,
    ) -> Self {
        let markdown = render_markdown(&headers, &rows);
        Self {
            id: id.into(),
            title: title.into(),
            headers,
            rows,
            markdown,
            page_number: None,
            confidence: None,
            extractor: extractor.into(),
        }
    }

    pub fn on_page(mut self, page: usize) -> Self {
        self.page_number = Some(page);
        self
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Render a GFM pipe table.
///
/// Body rows are padded with empty cells or truncated to exactly
/// `headers.len()` cells. An empty header renders to an empty string.
pub fn render_markdown(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let width = headers.len();
    let line = |cells: &[String]| format!("| {} |", cells.join(" | "));

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(line(headers));
    lines.push(line(&vec!["---".to_string(); width]));
    for row in rows {
        let mut cells: Vec<String> = row.iter().take(width).cloned().collect();
        cells.resize(width, String::new());
        lines.push(line(&cells));
    }
    lines.join("\n")
}

/// Length in Unicode scalar values.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl Chunk {
    /// Chunk `chunk-{index}` with an empty metadata map.
    pub fn new(
        index: usize,
        chunk_type: ChunkType,
        content: impl Into<String>,
        start_index: usize,
        end_index: usize,
    ) -> Self {
        Self {
            id: format!("chunk-{}", index),
            content: content.into(),
            start_index,
            end_index,
            chunk_type,
            metadata: ChunkMetadata::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_scope(self, scope: OffsetScope) -> Self {
        self.with_meta("offsetScope", scope.as_str())
    }

    /// Page number recorded in metadata, if any.
    pub fn page_number(&self) -> Option<usize> {
        self.metadata
            .get("pageNumber")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }

    /// Linked table id recorded in metadata, if any.
    pub fn table_id(&self) -> Option<&str> {
        self.metadata.get("tableId").and_then(Value::as_str)
    }
}

/// Everything a backend extracted, before counts and identity are stamped.
#[derive(Debug, Clone, Default)]
pub struct DocumentDraft {
    pub file_name: String,
    pub content_type: String,
    pub processor: String,
    pub content: String,
    pub chunks: Vec<Chunk>,
    pub tables: Vec<Table>,
    pub page_count: usize,
    pub language: Option<String>,
}

impl DocumentDraft {
    /// Stamp id, timestamp and counts and produce a successful Document.
    pub fn into_document(self) -> Document {
        let metadata = DocumentMetadata {
            page_count: self.page_count,
            word_count: self.content.split_whitespace().count(),
            character_count: char_len(&self.content),
            language: self
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            title: Some(self.file_name.clone()).filter(|t| !t.is_empty()),
        };
        Document {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: self.file_name,
            content: self.content,
            content_type: self.content_type,
            metadata,
            tables: self.tables,
            layout: Layout {
                has_multiple_columns: false,
                page_count: self.page_count,
                sections: Vec::new(),
            },
            chunks: self.chunks,
            processed_at: Utc::now(),
            success: true,
            processor: self.processor,
            error: None,
        }
    }
}

impl Document {
    /// A structurally complete failure record: one `error` chunk, no tables,
    /// zero counts.
    pub fn from_error(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        let detail = error.to_string();
        let message = format!("Error processing document: {}", detail);
        let chunk = Chunk::new(0, ChunkType::Error, message.clone(), 0, char_len(&message));
        Document {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            content: message,
            content_type: content_type.into(),
            metadata: DocumentMetadata {
                language: DEFAULT_LANGUAGE.to_string(),
                ..DocumentMetadata::default()
            },
            tables: Vec::new(),
            layout: Layout::default(),
            chunks: vec![chunk],
            processed_at: Utc::now(),
            success: false,
            processor: ERROR_PROCESSOR.to_string(),
            error: Some(detail),
        }
    }

    /// Chunks of one type, in emission order.
    pub fn chunks_of(&self, chunk_type: ChunkType) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(move |c| c.chunk_type == chunk_type)
    }

    /// Look up a table by id.
    pub fn table(&self, id: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }
}
