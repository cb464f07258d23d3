//! The Chunker: segments markdown-ish text into bounded, typed chunks.
//!
//! Text is split on blank lines into paragraphs. Prose accumulates in a
//! buffer that is flushed as one `paragraph` chunk when the next paragraph
//! would push it past the threshold. A paragraph starting with `|` is a
//! table: it flushes any pending prose and is emitted on its own as a
//! `table` chunk, linked to the first [`Table`] whose markdown it contains.
//!
//! Offsets are cumulative over emitted raw content: each chunk starts where
//! the previous one ended, and `end - start` is the length of the chunk's
//! content *before* trimming (a flushed buffer keeps its trailing blank-line
//! separators in the count).

use crate::document::{char_len, Chunk, ChunkType, OffsetScope, Table};
use std::collections::BTreeMap;
use tracing::debug;

/// Paragraph separator.
const PARAGRAPH_BREAK: &str = "\n\n";

/// Splits text into chunks of at most `threshold` characters of prose.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    threshold: usize,
}

impl Chunker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Chunk `text`, linking table chunks to entries of `tables`.
    pub fn chunk(&self, text: &str, tables: &[Table]) -> Vec<Chunk> {
        let mut state = ChunkState::default();

        for para in text.split(PARAGRAPH_BREAK).map(str::trim) {
            if para.is_empty() {
                continue;
            }
            let is_table = para.starts_with('|');
            let para_len = char_len(para);

            let over = state.buffer_len + para_len > self.threshold;
            if over || (is_table && !state.buffer.is_empty()) {
                state.flush_buffer();
            }

            if is_table {
                let table_id = tables
                    .iter()
                    .find(|t| !t.markdown.is_empty() && para.contains(t.markdown.as_str()))
                    .map(|t| t.id.clone());
                state.emit_table(para, para_len, table_id);
            } else {
                state.buffer.push_str(para);
                state.buffer.push_str(PARAGRAPH_BREAK);
                state.buffer_len += para_len + PARAGRAPH_BREAK.len();
            }
        }
        state.flush_buffer();

        debug!(
            "Chunker produced {} chunks (threshold {})",
            state.chunks.len(),
            self.threshold
        );
        state.chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHUNK_SIZE)
    }
}

/// Merge per-page text chunks with one `table` chunk per table.
///
/// Pages are visited in ascending order: a page's text chunks come first,
/// then the chunks of the tables found on it. Tables without a page go last.
/// Tables with an empty header have no markdown and get no chunk. Ids are
/// reassigned in the final order.
pub fn interleave_tables(page_chunks: Vec<Chunk>, tables: &[Table]) -> Vec<Chunk> {
    let mut by_page: BTreeMap<usize, Vec<Chunk>> = BTreeMap::new();
    let mut unpaged: Vec<Chunk> = Vec::new();
    for chunk in page_chunks {
        match chunk.page_number() {
            Some(page) => by_page.entry(page).or_default().push(chunk),
            None => unpaged.push(chunk),
        }
    }
    for table in tables.iter().filter(|t| !t.markdown.is_empty()) {
        let chunk = table_chunk(table);
        match table.page_number {
            Some(page) => by_page.entry(page).or_default().push(chunk),
            None => unpaged.push(chunk),
        }
    }

    let mut chunks: Vec<Chunk> = by_page.into_values().flatten().chain(unpaged).collect();
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.id = format!("chunk-{}", i);
    }
    chunks
}

fn table_chunk(table: &Table) -> Chunk {
    let mut chunk = Chunk::new(
        0,
        ChunkType::Table,
        table.markdown.clone(),
        0,
        char_len(&table.markdown),
    )
    .with_meta("hasTable", true)
    .with_meta("tableId", table.id.clone());
    if let Some(page) = table.page_number {
        chunk = chunk.with_meta("pageNumber", page);
    }
    chunk.with_scope(OffsetScope::Table)
}

#[derive(Default)]
struct ChunkState {
    chunks: Vec<Chunk>,
    buffer: String,
    /// `buffer` length in chars.
    buffer_len: usize,
    /// Cumulative length of emitted raw content.
    cursor: usize,
}

impl ChunkState {
    fn flush_buffer(&mut self) {
        let content = self.buffer.trim();
        if !content.is_empty() {
            let chunk = Chunk::new(
                self.chunks.len(),
                ChunkType::Paragraph,
                content,
                self.cursor,
                self.cursor + self.buffer_len,
            )
            .with_scope(OffsetScope::Document);
            self.chunks.push(chunk);
            self.cursor += self.buffer_len;
        }
        self.buffer.clear();
        self.buffer_len = 0;
    }

    fn emit_table(&mut self, para: &str, para_len: usize, table_id: Option<String>) {
        let mut chunk = Chunk::new(
            self.chunks.len(),
            ChunkType::Table,
            para,
            self.cursor,
            self.cursor + para_len,
        )
        .with_meta("hasTable", true);
        if let Some(id) = table_id {
            chunk = chunk.with_meta("tableId", id);
        }
        self.chunks.push(chunk.with_scope(OffsetScope::Document));
        self.cursor += para_len;
    }
}
