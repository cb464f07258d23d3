//! Extraction stages behind the Processor Selector.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ cloud ──▶ textract (HTTP) ──▶ blocks ───────────────┐
//! input ─────┤                                                       ├──▶ Document
//!  (path)    └─▶ local ──▶ pdfium (text, grid) ──▶ tables ──▶ chunk ─┘
//! ```
//!
//! 1. [`input`]     — validate the path, size and content type
//! 2. [`cloud`]     — format gate and OCR call through [`textract`], then
//!    [`blocks`] rebuilds lines, pages and tables from the block graph
//! 3. [`local`]     — [`pdfium`] page readers, built-in vs specialised table
//!    merge, markdown inputs
//! 4. [`tables`]    — pure table detectors shared by the readers
//! 5. [`chunk`]     — paragraph/table chunking and page interleaving
//! 6. [`normalize`] — deterministic cleanup of extracted text

pub mod blocks;
pub mod chunk;
pub mod cloud;
pub mod input;
pub mod local;
pub mod normalize;
pub mod pdfium;
pub mod tables;
pub mod textract;
