//! Block model of the cloud OCR service and the Block Graph Parser.
//!
//! The service returns a flat list of typed primitives. Pages contain lines,
//! lines contain words, tables contain cells and cells contain words; the
//! hierarchy is expressed only through `CHILD` relationships that reference
//! other blocks by id. [`BlockGraph`] indexes one response by id and
//! reconstructs from it:
//!
//! - the full text (LINE blocks in response order, one per line),
//! - one text per page (for per-page chunks),
//! - the table grids (sparse row → column map, densified at the end),
//! - the page count.
//!
//! The graph borrows the response and is dropped with it; nothing is shared
//! across documents.

use super::tables::Grid;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Largest `RowIndex`/`ColumnIndex` a CELL may carry; cells beyond it are
/// dropped before the grid is densified.
pub const MAX_TABLE_INDEX: usize = 1000;

/// Block kinds the parser reads. Every other kind (KEY_VALUE_SET,
/// SELECTION_ELEMENT, MERGED_CELL, ...) is kept as [`BlockType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
    Table,
    Cell,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Child,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: RelationshipType,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// A positioned primitive, as serialised by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub block_type: BlockType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    /// 1-based, CELL only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_index: Option<usize>,
    /// 1-based, CELL only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Block {
    /// Ids of every CHILD relationship, in order.
    fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|r| r.kind == RelationshipType::Child)
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }

    /// Ids of the first CHILD relationship only.
    fn first_child_ids(&self) -> Option<&[String]> {
        self.relationships
            .iter()
            .find(|r| r.kind == RelationshipType::Child)
            .map(|r| r.ids.as_slice())
    }

    /// Page number, with a missing page read as page 1.
    fn page_or_first(&self) -> usize {
        self.page.unwrap_or(1)
    }
}

/// A reconstructed table, before it becomes a [`crate::document::Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    /// Position among all TABLE blocks of the response, dropped ones included.
    pub ordinal: usize,
    pub page: Option<usize>,
    pub confidence: Option<f64>,
    pub grid: Grid,
}

/// Id index over one response's blocks.
pub struct BlockGraph<'a> {
    blocks: &'a [Block],
    index: HashMap<&'a str, &'a Block>,
}

impl<'a> BlockGraph<'a> {
    pub fn new(blocks: &'a [Block]) -> Self {
        let index = blocks.iter().map(|b| (b.id.as_str(), b)).collect();
        Self { blocks, index }
    }

    fn lines(&self) -> impl Iterator<Item = &'a Block> {
        let blocks: &'a [Block] = self.blocks;
        blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Line)
    }

    /// LINE texts in response order, trimmed, empty lines skipped, joined by `\n`.
    pub fn full_text(&self) -> String {
        self.lines()
            .filter_map(|b| b.text.as_deref().map(str::trim))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `(page, text)` for each page that has LINE blocks, ascending by page.
    ///
    /// A page's text is its LINE texts joined by `\n`, untrimmed; pages whose
    /// text is blank are skipped.
    pub fn page_texts(&self) -> Vec<(usize, String)> {
        let mut pages: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for line in self.lines() {
            pages
                .entry(line.page_or_first())
                .or_default()
                .push(line.text.as_deref().unwrap_or(""));
        }
        pages
            .into_iter()
            .map(|(page, lines)| (page, lines.join("\n")))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect()
    }

    /// Highest `Page` among all blocks; 0 when no block carries one.
    pub fn page_count(&self) -> usize {
        self.blocks.iter().filter_map(|b| b.page).max().unwrap_or(0)
    }

    /// Reconstruct every TABLE block that carries structure.
    pub fn tables(&self) -> Vec<ParsedTable> {
        self.blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Table)
            .enumerate()
            .filter_map(|(ordinal, table)| {
                self.table_grid(table).map(|grid| ParsedTable {
                    ordinal,
                    page: table.page,
                    confidence: table.confidence,
                    grid,
                })
            })
            .collect()
    }

    /// Place each CELL at `(RowIndex-1, ColumnIndex-1)` in a sparse map, then
    /// densify. Rows or columns no cell addresses are never invented beyond
    /// the maxima; gaps inside the rectangle become empty strings.
    fn table_grid(&self, table: &Block) -> Option<Grid> {
        let cell_ids = table.first_child_ids().filter(|ids| !ids.is_empty())?;

        let mut sparse: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
        for id in cell_ids {
            let Some(cell) = self.index.get(id.as_str()) else {
                continue;
            };
            if cell.block_type != BlockType::Cell {
                continue;
            }
            let row = cell.row_index.unwrap_or(1).saturating_sub(1);
            let col = cell.column_index.unwrap_or(1).saturating_sub(1);
            if row >= MAX_TABLE_INDEX || col >= MAX_TABLE_INDEX {
                debug!("Skipping cell {} at ({}, {}) outside table bounds", cell.id, row, col);
                continue;
            }
            sparse
                .entry(row)
                .or_default()
                .insert(col, self.cell_text(cell));
        }

        let max_row = *sparse.keys().next_back()?;
        let max_col = sparse
            .values()
            .filter_map(|cols| cols.keys().next_back())
            .copied()
            .max()?;

        let dense: Vec<Vec<String>> = (0..=max_row)
            .map(|r| {
                (0..=max_col)
                    .map(|c| {
                        sparse
                            .get(&r)
                            .and_then(|cols| cols.get(&c))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();
        Grid::from_rows(dense)
    }

    /// WORD children of a cell joined by single spaces.
    fn cell_text(&self, cell: &Block) -> String {
        cell.child_ids()
            .filter_map(|id| self.index.get(id))
            .filter(|b| b.block_type == BlockType::Word)
            .filter_map(|b| b.text.as_deref())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn block(kind: BlockType, id: &str) -> Block {
        Block {
            block_type: kind,
            id: id.to_string(),
            text: None,
            page: None,
            relationships: Vec::new(),
            row_index: None,
            column_index: None,
            confidence: None,
        }
    }

    pub(crate) fn line(id: &str, text: &str, page: usize) -> Block {
        Block {
            text: Some(text.to_string()),
            page: Some(page),
            ..block(BlockType::Line, id)
        }
    }

    pub(crate) fn word(id: &str, text: &str) -> Block {
        Block {
            text: Some(text.to_string()),
            ..block(BlockType::Word, id)
        }
    }

    pub(crate) fn children(ids: &[&str]) -> Vec<Relationship> {
        vec![Relationship {
            kind: RelationshipType::Child,
            ids: ids.iter().map(|s| s.to_string()).collect(),
        }]
    }

    pub(crate) fn cell(id: &str, row: usize, col: usize, words: &[&str]) -> Block {
        Block {
            row_index: Some(row),
            column_index: Some(col),
            relationships: children(words),
            ..block(BlockType::Cell, id)
        }
    }

    pub(crate) fn table(id: &str, page: usize, cells: &[&str]) -> Block {
        Block {
            page: Some(page),
            relationships: children(cells),
            confidence: Some(99.1),
            ..block(BlockType::Table, id)
        }
    }

    #[test]
    fn full_text_joins_non_empty_lines_in_response_order() {
        let blocks = vec![
            line("l2", "second", 1),
            line("l1", "  first  ", 1),
            line("l3", "   ", 1),
            line("l4", "third", 2),
        ];
        let g = BlockGraph::new(&blocks);
        assert_eq!(g.full_text(), "second\nfirst\nthird");
    }

    #[test]
    fn page_texts_group_by_page_and_sort() {
        let mut untagged = line("l0", "no page", 1);
        untagged.page = None;
        let blocks = vec![line("a", "p2 line", 2), untagged, line("b", "p1 line", 1)];
        let pages = BlockGraph::new(&blocks).page_texts();
        assert_eq!(
            pages,
            vec![(1, "no page\np1 line".to_string()), (2, "p2 line".to_string())]
        );
    }

    #[test]
    fn page_count_is_max_page() {
        let blocks = vec![line("a", "x", 3), line("b", "y", 1)];
        assert_eq!(BlockGraph::new(&blocks).page_count(), 3);
        assert_eq!(BlockGraph::new(&[]).page_count(), 0);
    }

    #[test]
    fn page_count_ignores_blocks_without_page() {
        let mut untagged = line("l", "no page", 1);
        untagged.page = None;
        let blocks = vec![untagged];
        let graph = BlockGraph::new(&blocks);
        assert_eq!(graph.page_count(), 0);
        // Chunk grouping still files the line under page 1.
        assert_eq!(graph.page_texts(), vec![(1, "no page".to_string())]);
    }

    #[test]
    fn cells_with_absurd_indices_are_skipped() {
        let blocks = vec![
            table("t", 1, &["c1", "c2"]),
            cell("c1", 1, 1, &["w1"]),
            cell("c2", 4_000_000_000, 2, &["w2"]),
            word("w1", "kept"),
            word("w2", "dropped"),
        ];
        let tables = BlockGraph::new(&blocks).tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].grid.headers, vec!["kept"]);
        assert!(tables[0].grid.rows.is_empty());
    }

    #[test]
    fn table_with_only_first_row_is_header_only() {
        let blocks = vec![
            table("t", 1, &["c1", "c2"]),
            cell("c1", 1, 1, &["w1"]),
            cell("c2", 1, 2, &["w2", "w3"]),
            word("w1", "Name"),
            word("w2", "Unit"),
            word("w3", "Price"),
        ];
        let tables = BlockGraph::new(&blocks).tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].grid.headers, vec!["Name", "Unit Price"]);
        assert!(tables[0].grid.rows.is_empty());
        assert_eq!(tables[0].confidence, Some(99.1));
    }

    #[test]
    fn gaps_are_filled_and_order_does_not_matter() {
        // Cells arrive out of order; (2,1) is missing.
        let blocks = vec![
            cell("c4", 2, 2, &["w4"]),
            word("w4", "d"),
            table("t", 1, &["c4", "c1", "c2"]),
            cell("c1", 1, 1, &["w1"]),
            cell("c2", 1, 2, &["w2"]),
            word("w1", "a"),
            word("w2", "b"),
        ];
        let tables = BlockGraph::new(&blocks).tables();
        assert_eq!(tables[0].grid.headers, vec!["a", "b"]);
        assert_eq!(tables[0].grid.rows, vec![vec!["".to_string(), "d".to_string()]]);
    }

    #[test]
    fn tables_without_structure_are_dropped_but_keep_ordinals() {
        let empty = Block {
            page: Some(1),
            ..block(BlockType::Table, "t0")
        };
        let blocks = vec![
            empty,
            table("t1", 1, &["missing-cell"]),
            table("t2", 2, &["c1"]),
            cell("c1", 1, 1, &[]),
        ];
        let tables = BlockGraph::new(&blocks).tables();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].ordinal, 2);
        assert_eq!(tables[0].page, Some(2));
        assert_eq!(tables[0].grid.headers, vec![""]);
    }

    #[test]
    fn non_cell_children_are_ignored() {
        let blocks = vec![
            table("t", 1, &["w", "c"]),
            word("w", "stray"),
            cell("c", 1, 1, &["w"]),
        ];
        let tables = BlockGraph::new(&blocks).tables();
        assert_eq!(tables[0].grid.headers, vec!["stray"]);
    }

    #[test]
    fn deserialises_service_json() {
        let json = r#"[
            {"BlockType":"LINE","Id":"1","Text":"Hello","Page":1,"Confidence":99.5,
             "Relationships":[{"Type":"CHILD","Ids":["2"]}]},
            {"BlockType":"WORD","Id":"2","Text":"Hello","Page":1},
            {"BlockType":"KEY_VALUE_SET","Id":"3","Page":1,"EntityTypes":["KEY"]},
            {"BlockType":"CELL","Id":"4","RowIndex":1,"ColumnIndex":2,
             "Relationships":[{"Type":"MERGED_CELL","Ids":[]}]}
        ]"#;
        let blocks: Vec<Block> = serde_json::from_str(json).unwrap();
        assert_eq!(blocks[0].block_type, BlockType::Line);
        assert_eq!(blocks[2].block_type, BlockType::Other);
        assert_eq!(blocks[3].column_index, Some(2));
        assert_eq!(blocks[3].relationships[0].kind, RelationshipType::Other);
    }
}
