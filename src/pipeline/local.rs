//! Local backend: page text, built-in tables, specialised tables, merge.
//!
//! A PDF is read by two [`PageReader`]s in sequence. The text reader is
//! mandatory and supplies page text plus low-fidelity tables; the table
//! reader is optional and, when it yields anything, replaces those tables
//! wholesale ([`merge_tables`]).
//!
//! Page text is appended to the Document content behind a
//! `--- Page N ---` marker line. Each non-blank page becomes one paragraph
//! chunk whose offsets point at exactly that page's text inside the
//! content (`offsetScope = "document"`).
//!
//! Plain text and markdown files skip the readers: the text is chunked
//! directly by the [`Chunker`] and its pipe tables become Tables.

use super::chunk::{interleave_tables, Chunker};
use super::input::{self, InputFile, LocalKind};
use super::normalize::{normalize_markdown, normalize_page_text};
use super::pdfium::{PageContent, PageReader, PdfiumGridReader, PdfiumTextReader};
use super::tables::{parse_markdown_tables, Grid};
use crate::config::ProcessorConfig;
use crate::document::{char_len, Chunk, ChunkType, Document, DocumentDraft, OffsetScope, Table};
use crate::error::DocnormError;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Processor tag when only the text reader ran.
pub const PROCESSOR_TEXT: &str = "local_pdfium";
/// Processor tag when the table reader was enabled as well.
pub const PROCESSOR_TABLES: &str = "local_pdfium_tables";
/// Processor tag for plain text / markdown inputs.
pub const PROCESSOR_MARKDOWN: &str = "local_markdown";

/// Extractor tag on tables parsed from markdown input.
pub const MARKDOWN_EXTRACTOR: &str = "markdown";

/// The local extraction backend.
#[derive(Clone)]
pub struct LocalBackend {
    text_reader: Arc<dyn PageReader>,
    table_reader: Option<Arc<dyn PageReader>>,
    chunker: Chunker,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("text_reader", &self.text_reader.name())
            .field("table_reader", &self.table_reader.as_ref().map(|r| r.name()))
            .field("chunk_size", &self.chunker.threshold())
            .finish()
    }
}

impl LocalBackend {
    pub fn new(
        text_reader: Arc<dyn PageReader>,
        table_reader: Option<Arc<dyn PageReader>>,
        chunk_size: usize,
    ) -> Self {
        Self {
            text_reader,
            table_reader,
            chunker: Chunker::new(chunk_size),
        }
    }

    /// pdfium readers as configured. `None` when the local backend is off.
    pub fn from_config(config: &ProcessorConfig) -> Option<Self> {
        if !config.local_available() {
            return None;
        }
        let text: Arc<dyn PageReader> =
            Arc::new(PdfiumTextReader::new(config.pdfium_lib_path.clone()));
        let tables: Option<Arc<dyn PageReader>> = config
            .table_extractor_enabled
            .then(|| {
                Arc::new(PdfiumGridReader::new(config.pdfium_lib_path.clone())) as Arc<dyn PageReader>
            });
        Some(Self::new(text, tables, config.chunk_size))
    }

    pub fn processor_tag(&self) -> &'static str {
        if self.table_reader.is_some() {
            PROCESSOR_TABLES
        } else {
            PROCESSOR_TEXT
        }
    }

    pub async fn extract(&self, file: &InputFile) -> Result<Document, DocnormError> {
        match input::local_kind(&file.path, &file.content_type) {
            LocalKind::Pdf => self.extract_pdf(file).await,
            LocalKind::Markdown => self.extract_markdown(file).await,
            LocalKind::Unsupported => Err(DocnormError::UnsupportedFormat {
                backend: "local extractor",
                content_type: file.content_type.clone(),
                supported: input::LOCAL_SUPPORTED,
            }),
        }
    }

    // ── PDF ──────────────────────────────────────────────────────────────────

    async fn extract_pdf(&self, file: &InputFile) -> Result<Document, DocnormError> {
        if !input::has_pdf_magic(&file.path) {
            return Err(DocnormError::CorruptPdf {
                path: file.path.clone(),
                detail: "missing %PDF header".to_string(),
            });
        }

        // ── Step 1: text + built-in tables ──────────────────────────────────
        let start = Instant::now();
        let pages = self.text_reader.read(&file.path).await?;
        info!(
            "{} read {} pages in {}ms",
            self.text_reader.name(),
            pages.len(),
            start.elapsed().as_millis()
        );
        let builtin = builtin_tables(&pages);

        // ── Step 2: specialised tables (optional, never fatal) ──────────────
        let specialised = match &self.table_reader {
            Some(reader) => read_specialised(reader.as_ref(), &file.path).await,
            None => None,
        };

        // ── Step 3: merge ───────────────────────────────────────────────────
        let tables = merge_tables(specialised, builtin);

        // ── Step 4: content + page chunks ───────────────────────────────────
        let (content, page_chunks) = assemble_pages(&pages);

        Ok(DocumentDraft {
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            processor: self.processor_tag().to_string(),
            content,
            chunks: interleave_tables(page_chunks, &tables),
            tables,
            page_count: pages.len(),
            language: None,
        }
        .into_document())
    }

    // ── Markdown / plain text ────────────────────────────────────────────────

    async fn extract_markdown(&self, file: &InputFile) -> Result<Document, DocnormError> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| DocnormError::LocalExtraction {
                extractor: MARKDOWN_EXTRACTOR,
                page: 1,
                detail: e.to_string(),
            })?;
        let content = normalize_markdown(&String::from_utf8_lossy(&bytes));

        let tables: Vec<Table> = parse_markdown_tables(&content)
            .into_iter()
            .filter_map(Grid::from_raw)
            .enumerate()
            .map(|(i, grid)| {
                Table::new(
                    format!("table-{}", i),
                    format!("Table {}", i + 1),
                    grid.headers,
                    grid.rows,
                    MARKDOWN_EXTRACTOR,
                )
            })
            .collect();
        let chunks = self.chunker.chunk(&content, &tables);
        debug!(
            "Markdown input {}: {} tables, {} chunks",
            file.file_name,
            tables.len(),
            chunks.len()
        );

        Ok(DocumentDraft {
            file_name: file.file_name.clone(),
            content_type: file.content_type.clone(),
            processor: PROCESSOR_MARKDOWN.to_string(),
            content,
            chunks,
            tables,
            page_count: 1,
            language: None,
        }
        .into_document())
    }
}

async fn read_specialised(reader: &dyn PageReader, path: &Path) -> Option<Vec<Table>> {
    match reader.read(path).await {
        Ok(pages) => {
            let tables = specialised_tables(&pages);
            info!("{} found {} tables", reader.name(), tables.len());
            Some(tables)
        }
        Err(e) => {
            warn!("{} unavailable, keeping built-in tables: {}", reader.name(), e);
            None
        }
    }
}

/// Final table set: the specialised extractor's tables when it produced any,
/// the built-in ones otherwise. No cell-level merging.
pub fn merge_tables(specialised: Option<Vec<Table>>, builtin: Vec<Table>) -> Vec<Table> {
    match specialised {
        Some(tables) if !tables.is_empty() => {
            debug!(
                "Using {} specialised tables over {} built-in",
                tables.len(),
                builtin.len()
            );
            tables
        }
        _ => builtin,
    }
}

/// Tables from the text reader, titled per page.
fn builtin_tables(pages: &[PageContent]) -> Vec<Table> {
    let mut tables = Vec::new();
    for page in pages {
        for (idx, raw) in page.tables.iter().enumerate() {
            if let Some(grid) = Grid::from_raw(raw.clone()) {
                tables.push(
                    Table::new(
                        format!("table-p{}-{}", page.number, idx),
                        format!("Table on Page {}", page.number),
                        grid.headers,
                        grid.rows,
                        PdfiumTextReader::NAME,
                    )
                    .on_page(page.number),
                );
            }
        }
    }
    tables
}

/// Tables from the table reader, numbered across the whole document.
fn specialised_tables(pages: &[PageContent]) -> Vec<Table> {
    let mut tables = Vec::new();
    for page in pages {
        for (idx, raw) in page.tables.iter().enumerate() {
            if let Some(grid) = Grid::from_raw(raw.clone()) {
                let title = format!("Table {}", tables.len() + 1);
                tables.push(
                    Table::new(
                        format!("table-p{}-{}", page.number, idx),
                        title,
                        grid.headers,
                        grid.rows,
                        PdfiumGridReader::NAME,
                    )
                    .on_page(page.number),
                );
            }
        }
    }
    tables
}

/// Join normalised page texts behind page markers and emit one chunk per
/// non-blank page. A chunk's `[start, end)` is its page text in `content`.
fn assemble_pages(pages: &[PageContent]) -> (String, Vec<Chunk>) {
    let mut content = String::new();
    let mut len = 0usize;
    let mut chunks = Vec::new();

    for page in pages {
        let text = normalize_page_text(&page.text);
        if text.is_empty() {
            continue;
        }
        if !content.is_empty() {
            content.push('\n');
            len += 1;
        }
        let marker = format!("--- Page {} ---\n", page.number);
        len += char_len(&marker);
        content.push_str(&marker);

        let start = len;
        len += char_len(&text);
        content.push_str(&text);
        let end = len;
        content.push('\n');
        len += 1;

        chunks.push(
            Chunk::new(chunks.len(), ChunkType::Paragraph, text, start, end)
                .with_meta("pageNumber", page.number)
                .with_scope(OffsetScope::Document),
        );
    }

    if content.ends_with('\n') {
        content.pop();
    }
    (content, chunks)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A reader returning canned pages, or failing.
    pub(crate) struct FakeReader {
        pub name: &'static str,
        pub pages: Result<Vec<PageContent>, String>,
        pub calls: AtomicUsize,
    }

    impl FakeReader {
        pub fn ok(name: &'static str, pages: Vec<PageContent>) -> Arc<Self> {
            Arc::new(Self {
                name,
                pages: Ok(pages),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(name: &'static str, detail: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                pages: Err(detail.to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageReader for FakeReader {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn read(&self, _: &Path) -> Result<Vec<PageContent>, DocnormError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .clone()
                .map_err(|detail| DocnormError::LocalExtraction {
                    extractor: self.name,
                    page: 1,
                    detail,
                })
        }
    }

    pub(crate) fn page(number: usize, text: &str, tables: Vec<Vec<Vec<&str>>>) -> PageContent {
        PageContent {
            number,
            text: text.to_string(),
            tables: tables
                .into_iter()
                .map(|t| {
                    t.into_iter()
                        .map(|row| row.into_iter().map(|c| Some(c.to_string())).collect())
                        .collect()
                })
                .collect(),
        }
    }

    fn pdf_file() -> (tempfile::NamedTempFile, InputFile) {
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"%PDF-1.7\n").unwrap();
        let file = input::resolve(tmp.path(), None).unwrap();
        (tmp, file)
    }

    fn table(id: &str) -> Table {
        Table::new(id, "T", vec!["h".into()], vec![], "x")
    }

    #[test]
    fn merge_prefers_non_empty_specialised_result() {
        let merged = merge_tables(Some(vec![table("s0")]), vec![table("b0"), table("b1")]);
        let ids: Vec<&str> = merged.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["s0"]);
    }

    #[test]
    fn merge_keeps_builtin_when_specialised_empty_or_absent() {
        assert_eq!(merge_tables(Some(vec![]), vec![table("b0")])[0].id, "b0");
        assert_eq!(merge_tables(None, vec![table("b0")])[0].id, "b0");
        assert!(merge_tables(None, vec![]).is_empty());
    }

    #[test]
    fn page_offsets_point_at_page_text() {
        let pages = vec![
            page(1, "First page\r\n", vec![]),
            page(2, "   \n", vec![]),
            page(3, "Third page", vec![]),
        ];
        let (content, chunks) = assemble_pages(&pages);
        assert_eq!(content, "--- Page 1 ---\nFirst page\n\n--- Page 3 ---\nThird page");
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            let slice: String = content
                .chars()
                .skip(chunk.start_index)
                .take(chunk.end_index - chunk.start_index)
                .collect();
            assert_eq!(slice, chunk.content);
        }
        assert_eq!(chunks[1].page_number(), Some(3));
        assert_eq!(chunks[1].metadata["offsetScope"], "document");
    }

    #[test]
    fn specialised_tables_are_numbered_across_pages() {
        let pages = vec![
            page(1, "", vec![vec![vec!["a", "b"], vec!["1", "2"]]]),
            page(2, "", vec![vec![vec!["c", "d"]], vec![vec!["e", "f"]]]),
        ];
        let titles: Vec<String> = specialised_tables(&pages)
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Table 1", "Table 2", "Table 3"]);
    }

    #[tokio::test]
    async fn two_page_pdf_with_specialised_table() {
        let text = FakeReader::ok(
            "text",
            vec![
                page(1, "Intro", vec![vec![vec!["x", "y"], vec!["1", "2"]]]),
                page(2, "Body", vec![]),
            ],
        );
        let grid = FakeReader::ok(
            "grid",
            vec![
                page(1, "", vec![]),
                page(2, "", vec![vec![vec!["Item", "Qty"], vec!["Bolt", "4"]]]),
            ],
        );
        let backend = LocalBackend::new(text, Some(grid), 1500);
        let (_tmp, file) = pdf_file();
        let doc = backend.extract(&file).await.unwrap();

        assert!(doc.success);
        assert_eq!(doc.processor, PROCESSOR_TABLES);
        assert_eq!(doc.metadata.page_count, 2);
        assert_eq!(doc.metadata.word_count, doc.content.split_whitespace().count());
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].extractor, PdfiumGridReader::NAME);
        assert_eq!(doc.tables[0].page_number, Some(2));

        let layout: Vec<(ChunkType, Option<usize>)> = doc
            .chunks
            .iter()
            .map(|c| (c.chunk_type, c.page_number()))
            .collect();
        assert_eq!(
            layout,
            vec![
                (ChunkType::Paragraph, Some(1)),
                (ChunkType::Paragraph, Some(2)),
                (ChunkType::Table, Some(2)),
            ]
        );
        assert_eq!(doc.chunks[2].content, doc.tables[0].markdown);
    }

    #[tokio::test]
    async fn failing_table_reader_keeps_builtin_tables() {
        let text = FakeReader::ok(
            "text",
            vec![page(1, "Intro", vec![vec![vec!["x", "y"], vec!["1", "2"]]])],
        );
        let grid = FakeReader::failing("grid", "library missing");
        let backend = LocalBackend::new(text, Some(grid.clone()), 1500);
        let (_tmp, file) = pdf_file();
        let doc = backend.extract(&file).await.unwrap();

        assert_eq!(grid.calls.load(Ordering::SeqCst), 1);
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].title, "Table on Page 1");
        assert_eq!(doc.tables[0].extractor, PdfiumTextReader::NAME);
    }

    #[tokio::test]
    async fn text_reader_failure_is_an_error() {
        let backend = LocalBackend::new(FakeReader::failing("text", "boom"), None, 1500);
        let (_tmp, file) = pdf_file();
        let err = backend.extract(&file).await.unwrap_err();
        assert!(matches!(err, DocnormError::LocalExtraction { .. }));
    }

    #[tokio::test]
    async fn non_pdf_bytes_are_rejected_before_reading() {
        let text = FakeReader::ok("text", vec![]);
        let backend = LocalBackend::new(text.clone(), None, 1500);
        let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        tmp.write_all(b"not a pdf").unwrap();
        let file = input::resolve(tmp.path(), None).unwrap();
        let err = backend.extract(&file).await.unwrap_err();
        assert!(matches!(err, DocnormError::CorruptPdf { .. }));
        assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn markdown_input_is_chunked_directly() {
        let text = FakeReader::ok("text", vec![]);
        let backend = LocalBackend::new(text.clone(), None, 1500);
        let mut tmp = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        write!(
            tmp,
            "# Notes\r\n\r\nSome prose.\r\n\r\n| A | B |\r\n| --- | --- |\r\n| 1 | 2 |\r\n"
        )
        .unwrap();
        let file = input::resolve(tmp.path(), None).unwrap();
        let doc = backend.extract(&file).await.unwrap();

        assert_eq!(text.calls.load(Ordering::SeqCst), 0);
        assert_eq!(doc.processor, PROCESSOR_MARKDOWN);
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].headers, vec!["A", "B"]);
        let kinds: Vec<ChunkType> = doc.chunks.iter().map(|c| c.chunk_type).collect();
        assert_eq!(kinds, vec![ChunkType::Paragraph, ChunkType::Table]);
        assert_eq!(doc.chunks[1].table_id(), Some("table-0"));
    }

    #[tokio::test]
    async fn images_are_not_a_local_format() {
        let backend = LocalBackend::new(FakeReader::ok("text", vec![]), None, 1500);
        let tmp = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let file = input::resolve(tmp.path(), None).unwrap();
        let err = backend.extract(&file).await.unwrap_err();
        assert!(err.to_string().contains("Supported: PDF, TXT, MD"));
    }
}
