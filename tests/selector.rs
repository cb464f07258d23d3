//! Integration tests for the Processor Selector.
//!
//! Both backends run against in-memory fakes: a scripted `OcrService` in
//! place of Textract and canned `PageReader`s in place of pdfium. No network,
//! no native library. Inputs are `tempfile` fixtures that only need the
//! right extension, size and `%PDF` header.

use async_trait::async_trait;
use docnorm::pipeline::blocks::Block;
use docnorm::{
    ApiMode, ChunkType, DocnormError, Document, DocumentProcessor, DocumentStore, LocalBackend,
    MemoryDocumentStore, OcrResponse, OcrService, PageContent, PageReader, ProcessorConfig,
};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MB: u64 = 1024 * 1024;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// OCR service that returns fixed blocks or a fixed service error.
struct ScriptedOcr {
    outcome: Result<Vec<Block>, (&'static str, &'static str)>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    fn returning(blocks: Vec<Block>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(blocks),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(code: &'static str, message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err((code, message)),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn analyze(&self, _document: &[u8], _mode: ApiMode) -> Result<OcrResponse, DocnormError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(blocks) => Ok(OcrResponse {
                blocks: blocks.clone(),
                document_metadata: None,
            }),
            Err((code, message)) => Err(DocnormError::CloudApi {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Page reader with canned pages.
struct CannedPages {
    name: &'static str,
    pages: Vec<PageContent>,
    calls: AtomicUsize,
}

impl CannedPages {
    fn new(name: &'static str, pages: Vec<PageContent>) -> Arc<Self> {
        Arc::new(Self {
            name,
            pages,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageReader for CannedPages {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn read(&self, _path: &Path) -> Result<Vec<PageContent>, DocnormError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.clone())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn page(number: usize, text: &str) -> PageContent {
    PageContent {
        number,
        text: text.to_string(),
        tables: Vec::new(),
    }
}

fn grid(rows: &[&[&str]]) -> Vec<Vec<Option<String>>> {
    rows.iter()
        .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
        .collect()
}

/// Page 1 text only; page 2 a 2×2 table (header + one row) from the grid reader.
fn two_page_local() -> LocalBackend {
    let text = CannedPages::new(
        "text",
        vec![page(1, "Annual summary"), page(2, "Figures below")],
    );
    let mut table_page = page(2, "");
    table_page.tables.push(grid(&[&["Region", "Sales"], &["EU", "42"]]));
    let tables = CannedPages::new("grid", vec![page(1, ""), table_page]);
    LocalBackend::new(text, Some(tables), 1500)
}

fn blocks(value: serde_json::Value) -> Vec<Block> {
    serde_json::from_value(value).unwrap()
}

fn cloud_blocks() -> Vec<Block> {
    blocks(json!([
        {"BlockType": "PAGE", "Id": "p1", "Page": 1},
        {"BlockType": "LINE", "Id": "l1", "Text": "Invoice 2024-17", "Page": 1},
        {"BlockType": "LINE", "Id": "l2", "Text": "Total due", "Page": 1},
        {"BlockType": "TABLE", "Id": "t1", "Page": 1, "Confidence": 98.5,
         "Relationships": [{"Type": "CHILD", "Ids": ["c1", "c2", "c3", "c4"]}]},
        {"BlockType": "CELL", "Id": "c1", "RowIndex": 1, "ColumnIndex": 1, "Page": 1,
         "Relationships": [{"Type": "CHILD", "Ids": ["w1"]}]},
        {"BlockType": "CELL", "Id": "c2", "RowIndex": 1, "ColumnIndex": 2, "Page": 1,
         "Relationships": [{"Type": "CHILD", "Ids": ["w2"]}]},
        {"BlockType": "CELL", "Id": "c3", "RowIndex": 2, "ColumnIndex": 1, "Page": 1,
         "Relationships": [{"Type": "CHILD", "Ids": ["w3"]}]},
        {"BlockType": "CELL", "Id": "c4", "RowIndex": 2, "ColumnIndex": 2, "Page": 1,
         "Relationships": [{"Type": "CHILD", "Ids": ["w4", "w5"]}]},
        {"BlockType": "WORD", "Id": "w1", "Text": "Item", "Page": 1},
        {"BlockType": "WORD", "Id": "w2", "Text": "Amount", "Page": 1},
        {"BlockType": "WORD", "Id": "w3", "Text": "Consulting", "Page": 1},
        {"BlockType": "WORD", "Id": "w4", "Text": "1,200", "Page": 1},
        {"BlockType": "WORD", "Id": "w5", "Text": "EUR", "Page": 1},
        {"BlockType": "KEY_VALUE_SET", "Id": "kv1", "Page": 1}
    ]))
}

fn config(cloud: bool, fallback: bool) -> ProcessorConfig {
    ProcessorConfig::builder()
        .cloud_enabled(cloud)
        .local_fallback(fallback)
        .max_file_size_mb(10)
        .build()
        .unwrap()
}

fn pdf_fixture(len: u64) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    tmp.write_all(b"%PDF-1.7\n").unwrap();
    if len > 0 {
        tmp.as_file().set_len(len).unwrap();
    }
    tmp
}

/// Structural invariants every failed Document must satisfy.
fn assert_error_document(doc: &Document, needle: &str) {
    assert!(!doc.success);
    assert_eq!(doc.processor, "error");
    assert_eq!(doc.chunks.len(), 1, "exactly one chunk");
    assert_eq!(doc.chunks[0].chunk_type, ChunkType::Error);
    assert_eq!(doc.chunks[0].id, "chunk-0");
    assert!(doc.tables.is_empty());
    assert_eq!(doc.metadata.page_count, 0);
    assert_eq!(doc.metadata.word_count, 0);
    assert_eq!(doc.metadata.character_count, 0);
    let detail = doc.error.as_deref().unwrap_or_default();
    assert!(detail.contains(needle), "error {detail:?} lacks {needle:?}");
    assert!(doc.chunks[0].content.starts_with("Error processing document: "));
}

// ── Routing ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_oversized_file_goes_local_without_cloud_call() {
    let ocr = ScriptedOcr::returning(cloud_blocks());
    let processor =
        DocumentProcessor::with_backends(config(true, true), Some(ocr.clone()), Some(two_page_local()));

    let tmp = pdf_fixture(50 * MB);
    let doc = processor.process(tmp.path(), None).await;

    assert_eq!(ocr.calls(), 0, "cloud must not be attempted");
    assert!(doc.success, "{:?}", doc.error);
    assert_eq!(doc.processor, "local_pdfium_tables");
}

#[tokio::test]
async fn test_page_limit_routes_local() {
    let ocr = ScriptedOcr::returning(cloud_blocks());
    let processor =
        DocumentProcessor::with_backends(config(true, true), Some(ocr.clone()), Some(two_page_local()));

    let tmp = pdf_fixture(0);
    let doc = processor.process_with_pages(tmp.path(), None, Some(101)).await;

    assert_eq!(ocr.calls(), 0);
    assert!(doc.processor.starts_with("local_"));
}

#[tokio::test]
async fn test_cloud_success_uses_page_scoped_chunks() {
    let ocr = ScriptedOcr::returning(cloud_blocks());
    let processor =
        DocumentProcessor::with_backends(config(true, true), Some(ocr.clone()), Some(two_page_local()));

    let tmp = pdf_fixture(0);
    let doc = processor.process(tmp.path(), None).await;

    assert_eq!(ocr.calls(), 1);
    assert!(doc.success);
    assert_eq!(doc.processor, "textract_analyze");
    assert_eq!(doc.content, "Invoice 2024-17\nTotal due");
    assert_eq!(doc.metadata.page_count, 1);
    assert_eq!(doc.tables.len(), 1);
    assert_eq!(doc.tables[0].rows, vec![vec!["Consulting", "1,200 EUR"]]);
    assert_eq!(doc.tables[0].confidence, Some(98.5));

    assert_eq!(doc.chunks.len(), 2);
    assert_eq!(doc.chunks[0].metadata["offsetScope"], "page");
    assert_eq!(doc.chunks[1].chunk_type, ChunkType::Table);
    assert_eq!(doc.chunks[1].metadata["tableId"], "table-0");
}

#[tokio::test]
async fn test_cloud_failure_falls_back_to_local() {
    let ocr = ScriptedOcr::failing("ThrottlingException", "Rate exceeded");
    let processor =
        DocumentProcessor::with_backends(config(true, true), Some(ocr.clone()), Some(two_page_local()));

    let tmp = pdf_fixture(0);
    let doc = processor.process(tmp.path(), None).await;

    assert_eq!(ocr.calls(), 1);
    assert!(doc.success);
    assert_eq!(doc.processor, "local_pdfium_tables");
    assert!(doc.error.is_none());
}

#[tokio::test]
async fn test_cloud_failure_without_fallback_is_error_document() {
    let ocr = ScriptedOcr::failing("ThrottlingException", "Rate exceeded");
    let processor =
        DocumentProcessor::with_backends(config(true, false), Some(ocr.clone()), Some(two_page_local()));

    let tmp = pdf_fixture(0);
    let doc = processor.process(tmp.path(), None).await;

    assert_eq!(ocr.calls(), 1);
    assert_error_document(&doc, "Textract API error: ThrottlingException - Rate exceeded");
}

#[tokio::test]
async fn test_unsupported_cloud_format_falls_back_before_any_call() {
    let ocr = ScriptedOcr::returning(cloud_blocks());
    let processor =
        DocumentProcessor::with_backends(config(true, true), Some(ocr.clone()), Some(two_page_local()));

    let mut tmp = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
    writeln!(tmp, "# Title\n\nBody text.").unwrap();
    let doc = processor.process(tmp.path(), None).await;

    assert_eq!(ocr.calls(), 0);
    assert!(doc.success);
    assert_eq!(doc.processor, "local_markdown");
}

#[tokio::test]
async fn test_no_processor_available() {
    let processor = DocumentProcessor::with_backends(config(false, false), None, None);
    assert_eq!(processor.mode(), "disabled");

    let tmp = pdf_fixture(0);
    let doc = processor.process(tmp.path(), None).await;
    assert_error_document(&doc, "No document processor available");
    assert_eq!(doc.content_type, "application/pdf");
}

#[tokio::test]
async fn test_local_failure_is_terminal() {
    let ocr = ScriptedOcr::failing("InvalidParameterException", "bad document");
    let processor =
        DocumentProcessor::with_backends(config(true, true), Some(ocr.clone()), Some(two_page_local()));

    // A `.pdf` without the magic bytes: cloud fails first, local rejects it.
    let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    tmp.write_all(b"plain text pretending").unwrap();
    let doc = processor.process(tmp.path(), None).await;

    assert_eq!(ocr.calls(), 1);
    assert_error_document(&doc, "missing %PDF header");
}

// ── End to end ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_page_document_end_to_end() {
    let processor = DocumentProcessor::with_backends(config(false, true), None, Some(two_page_local()));

    let tmp = pdf_fixture(0);
    let doc = processor.process(tmp.path(), None).await;

    assert!(doc.success);
    assert_eq!(doc.metadata.page_count, 2);
    assert_eq!(doc.layout.page_count, 2);
    assert_eq!(doc.tables.len(), 1);
    assert_eq!(doc.tables[0].headers, vec!["Region", "Sales"]);
    assert_eq!(doc.tables[0].rows.len(), 1);
    assert_eq!(doc.tables[0].page_number, Some(2));
    assert_eq!(doc.chunks_of(ChunkType::Table).count(), 1);

    let ids: Vec<&str> = doc.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["chunk-0", "chunk-1", "chunk-2"]);
    for chunk in doc.chunks_of(ChunkType::Paragraph) {
        assert!(chunk.end_index >= chunk.start_index);
        let slice: String = doc
            .content
            .chars()
            .skip(chunk.start_index)
            .take(chunk.end_index - chunk.start_index)
            .collect();
        assert_eq!(slice, chunk.content);
    }
}

#[tokio::test]
async fn test_document_json_contract() {
    let processor = DocumentProcessor::with_backends(config(false, true), None, Some(two_page_local()));
    let tmp = pdf_fixture(0);

    let ok = serde_json::to_value(processor.process(tmp.path(), None).await).unwrap();
    for key in [
        "id", "fileName", "content", "type", "metadata", "tables", "layout", "chunks",
        "processedAt", "success", "processor",
    ] {
        assert!(ok.get(key).is_some(), "missing {key}");
    }
    assert!(ok.get("error").is_none());
    assert_eq!(ok["metadata"]["pageCount"], 2);
    assert_eq!(ok["metadata"]["language"], "en");
    assert_eq!(ok["layout"]["hasMultipleColumns"], false);
    assert_eq!(ok["chunks"][0]["type"], "paragraph");
    assert!(ok["chunks"][0]["startIndex"].is_u64());

    let failed = serde_json::to_value(processor.process("/missing.pdf", None).await).unwrap();
    assert_eq!(failed["success"], false);
    assert_eq!(failed["chunks"][0]["type"], "error");
    assert!(failed["error"].as_str().unwrap().contains("File not found"));
}

#[tokio::test]
async fn test_concurrent_documents_are_independent() {
    let processor = DocumentProcessor::with_backends(config(false, true), None, Some(two_page_local()));
    let fixtures: Vec<_> = (0..6).map(|_| pdf_fixture(0)).collect();

    let docs = futures::future::join_all(fixtures.iter().map(|f| processor.process(f.path(), None))).await;

    let store = MemoryDocumentStore::new();
    for doc in docs {
        assert!(doc.success);
        store.create(doc).await.unwrap();
    }
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 6, "ids must be unique");
    assert_eq!(stats.tables, 6);
    assert_eq!(stats.by_processor["local_pdfium_tables"], 6);
}
