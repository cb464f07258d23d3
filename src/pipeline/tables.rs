//! Table detection algorithms.
//!
//! Everything here is pure: no pdfium, no I/O. The pdfium readers in
//! [`super::pdfium`] collect text or positioned spans and hand them to one of
//! three detectors:
//!
//! - [`detect_text_tables`] — low-fidelity detector over plain text lines.
//!   A run of at least two lines that split into the same number (≥ 2) of
//!   columns on wide whitespace gaps is a table.
//! - [`GridDetector`] — positional detector over [`TextSpan`]s. Spans are
//!   grouped into rows by baseline, column edges are found from left edges
//!   that align across rows, and contiguous aligned rows become a grid.
//! - [`parse_markdown_tables`] — GFM pipe tables in markdown input.
//!
//! Detectors return [`RawGrid`]s (nullable cells). [`Grid::from_raw`] turns a
//! raw grid into header + body with `None` normalised to `""`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Rows of nullable cells, as produced by an extractor.
pub type RawGrid = Vec<Vec<Option<String>>>;

/// A header row plus body rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Grid {
    /// First row becomes the header. Returns `None` for an empty grid.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let headers = rows.remove(0);
        Some(Self { headers, rows })
    }

    /// Like [`Grid::from_rows`], with missing cells read as empty strings.
    pub fn from_raw(raw: RawGrid) -> Option<Self> {
        Self::from_rows(
            raw.into_iter()
                .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
                .collect(),
        )
    }
}

// ── Text-column detector ─────────────────────────────────────────────────────

static RE_COLUMN_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+|\s{2,}").unwrap());

/// Split a line into columns on tabs or runs of two or more spaces.
pub fn split_columns(line: &str) -> Vec<String> {
    RE_COLUMN_GAP
        .split(line.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Find whitespace-aligned tables in plain text.
///
/// A table is a run of at least `min_rows` consecutive lines that each split
/// into the same number of columns, that number being ≥ 2.
pub fn detect_text_tables(text: &str, min_rows: usize) -> Vec<RawGrid> {
    let mut grids = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();

    let mut flush = |run: &mut Vec<Vec<String>>| {
        if run.len() >= min_rows.max(2) {
            grids.push(
                run.drain(..)
                    .map(|cells| cells.into_iter().map(Some).collect())
                    .collect(),
            );
        } else {
            run.clear();
        }
    };

    for line in text.lines() {
        let cells = split_columns(line);
        let continues = cells.len() >= 2 && run.first().is_none_or(|r| r.len() == cells.len());
        if continues {
            run.push(cells);
            continue;
        }
        flush(&mut run);
        if cells.len() >= 2 {
            run.push(cells);
        }
    }
    flush(&mut run);
    grids
}

// ── Positional grid detector ─────────────────────────────────────────────────

/// A run of text with its position on the page (PDF points, origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    /// Left edge.
    pub x: f32,
    /// Baseline (bottom edge).
    pub y: f32,
    pub width: f32,
    /// Glyph height, used for the row tolerance.
    pub font_size: f32,
}

#[derive(Debug, Clone)]
pub struct GridDetectorConfig {
    /// Minimum number of rows to consider as a table.
    pub min_rows: usize,
    /// Minimum number of columns.
    pub min_columns: usize,
    /// Above this the spans are probably single words, not cells.
    pub max_columns: usize,
    /// Row grouping tolerance as a fraction of font size.
    pub y_tolerance_factor: f32,
    /// Fraction of a row's spans that must sit on a column edge.
    pub min_alignment_ratio: f32,
    /// Minimum distance between two column edges (points).
    pub min_column_gap: f32,
}

impl Default for GridDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 8,
            y_tolerance_factor: 0.4,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
        }
    }
}

/// X positions are bucketed to this many points before counting alignment.
const EDGE_BUCKET: f32 = 5.0;

/// A span this close to a column edge counts as aligned.
const ALIGN_TOLERANCE: f32 = 5.0;

#[derive(Debug, Clone)]
struct SpanRow {
    spans: Vec<TextSpan>,
}

/// Detects tables from text alignment, without ruling lines.
#[derive(Debug, Clone, Default)]
pub struct GridDetector {
    config: GridDetectorConfig,
}

impl GridDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GridDetectorConfig) -> Self {
        Self { config }
    }

    /// Detect tables among the spans of one page, top to bottom.
    pub fn detect(&self, spans: &[TextSpan]) -> Vec<RawGrid> {
        let cfg = &self.config;
        if spans.len() < cfg.min_rows * cfg.min_columns {
            return Vec::new();
        }

        let rows = self.group_into_rows(spans);
        if rows.len() < cfg.min_rows {
            return Vec::new();
        }

        let columns = self.detect_columns(&rows);
        if columns.len() < cfg.min_columns {
            return Vec::new();
        }

        let mut grids = Vec::new();
        for (start, end) in self.find_regions(&rows, &columns) {
            let region = &rows[start..=end];
            // Re-detect for this region only; page-wide edges over-split.
            let cols = self.detect_columns(region);
            if cols.len() < cfg.min_columns || cols.len() > cfg.max_columns {
                continue;
            }
            if is_list_pattern(region, &cols) {
                continue;
            }
            grids.push(to_grid(region, &cols));
        }
        grids
    }

    fn group_into_rows(&self, spans: &[TextSpan]) -> Vec<SpanRow> {
        let mut sorted = spans.to_vec();
        // Top of page first (larger y), then left to right.
        sorted.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

        let mut rows: Vec<SpanRow> = Vec::new();
        let mut current: Vec<TextSpan> = Vec::new();
        let mut current_y: Option<f32> = None;

        for span in sorted {
            let tolerance = span.font_size * self.config.y_tolerance_factor;
            match current_y {
                Some(y) if (span.y - y).abs() <= tolerance => current.push(span),
                _ => {
                    if !current.is_empty() {
                        rows.push(SpanRow {
                            spans: std::mem::take(&mut current),
                        });
                    }
                    current_y = Some(span.y);
                    current.push(span);
                }
            }
        }
        if !current.is_empty() {
            rows.push(SpanRow { spans: current });
        }
        for row in &mut rows {
            row.spans.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        rows
    }

    /// Column edges: left edges shared by enough rows, merged when closer
    /// than `min_column_gap`. Rows with a single span are ignored when there
    /// are enough multi-span rows to decide from.
    fn detect_columns(&self, rows: &[SpanRow]) -> Vec<f32> {
        let multi: Vec<&SpanRow> = rows.iter().filter(|r| r.spans.len() >= 2).collect();
        let considered: Vec<&SpanRow> = if multi.len() >= self.config.min_rows {
            multi
        } else {
            rows.iter().collect()
        };
        if considered.is_empty() {
            return Vec::new();
        }

        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        for row in &considered {
            let buckets: HashSet<i32> = row
                .spans
                .iter()
                .map(|s| (s.x / EDGE_BUCKET).round() as i32)
                .collect();
            for bucket in buckets {
                *edge_counts.entry(bucket).or_insert(0) += 1;
            }
        }

        let min_occurrences =
            ((considered.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);

        let mut edges: Vec<f32> = edge_counts
            .into_iter()
            .filter(|(_, count)| *count >= min_occurrences)
            .map(|(bucket, _)| bucket as f32 * EDGE_BUCKET)
            .collect();
        edges.sort_by(f32::total_cmp);

        let mut merged: Vec<f32> = Vec::new();
        for edge in edges {
            match merged.last() {
                Some(&last) if edge - last < self.config.min_column_gap => {}
                _ => merged.push(edge),
            }
        }
        merged
    }

    /// Contiguous runs of aligned rows, at least `min_rows` long.
    fn find_regions(&self, rows: &[SpanRow], columns: &[f32]) -> Vec<(usize, usize)> {
        let mut regions = Vec::new();
        let mut start: Option<usize> = None;

        for (i, row) in rows.iter().enumerate() {
            let aligned = row.spans.len() >= 2
                && alignment_score(row, columns) >= self.config.min_alignment_ratio;
            match (aligned, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    if i - s >= self.config.min_rows {
                        regions.push((s, i - 1));
                    }
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            if rows.len() - s >= self.config.min_rows {
                regions.push((s, rows.len() - 1));
            }
        }
        regions
    }
}

fn alignment_score(row: &SpanRow, columns: &[f32]) -> f32 {
    if row.spans.is_empty() || columns.is_empty() {
        return 0.0;
    }
    let aligned = row
        .spans
        .iter()
        .filter(|s| columns.iter().any(|c| (s.x - c).abs() <= ALIGN_TOLERANCE))
        .count();
    aligned as f32 / row.spans.len() as f32
}

/// Index of the last column edge at or left of `x` (with alignment
/// tolerance). Spans left of every edge land in the first column.
fn column_for(x: f32, columns: &[f32]) -> usize {
    columns
        .iter()
        .rposition(|&c| x >= c - ALIGN_TOLERANCE)
        .unwrap_or(0)
}

fn to_grid(rows: &[SpanRow], columns: &[f32]) -> RawGrid {
    rows.iter()
        .map(|row| {
            let mut cells: Vec<Vec<&str>> = vec![Vec::new(); columns.len()];
            for span in &row.spans {
                let text = span.text.trim();
                if !text.is_empty() {
                    cells[column_for(span.x, columns)].push(text);
                }
            }
            cells
                .into_iter()
                .map(|parts| {
                    if parts.is_empty() {
                        None
                    } else {
                        Some(parts.join(" "))
                    }
                })
                .collect()
        })
        .collect()
}

/// Numbered or bulleted lists split into marker + text spans look like a
/// two-column table.
fn is_list_pattern(rows: &[SpanRow], columns: &[f32]) -> bool {
    if columns.len() < 2 || rows.is_empty() {
        return false;
    }
    let mut bullets = 0usize;
    let mut numbers = 0usize;
    for row in rows {
        if let Some(first) = row.spans.first() {
            let text = first.text.trim();
            if is_bullet_marker(text) {
                bullets += 1;
            } else if is_number_marker(text) {
                numbers += 1;
            }
        }
    }
    let total = rows.len() as f32;
    if bullets as f32 / total >= 0.5 {
        return true;
    }
    columns.len() == 2 && (bullets + numbers) as f32 / total >= 0.5
}

fn is_bullet_marker(text: &str) -> bool {
    matches!(
        text,
        "-" | "–" | "—" | "•" | "·" | "*" | "○" | "▪" | "◦" | "►" | "■" | "●" | "□" | "◆" | "▶"
    )
}

static RE_NUMBER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+\s*[.)]?|[A-Za-z][.)])$").unwrap());

fn is_number_marker(text: &str) -> bool {
    RE_NUMBER_MARKER.is_match(text)
}

// ── Markdown pipe tables ─────────────────────────────────────────────────────

static RE_SEPARATOR_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?$").unwrap());

fn is_pipe_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn pipe_cells(line: &str) -> Vec<Option<String>> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner
        .split('|')
        .map(|c| {
            let c = c.trim();
            if c.is_empty() {
                None
            } else {
                Some(c.to_string())
            }
        })
        .collect()
}

/// Parse GFM pipe tables. Separator rows (`| --- | :---: |`) are dropped; a
/// table is any run of consecutive lines starting with `|`.
pub fn parse_markdown_tables(text: &str) -> Vec<RawGrid> {
    let mut grids = Vec::new();
    let mut current: RawGrid = Vec::new();
    for line in text.lines() {
        if is_pipe_row(line) {
            if !RE_SEPARATOR_ROW.is_match(line.trim()) {
                current.push(pipe_cells(line));
            }
        } else if !current.is_empty() {
            grids.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        grids.push(current);
    }
    grids
}
