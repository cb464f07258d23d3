//! Deterministic cleanup of extracted page text.
//!
//! pdfium hands back text with the producer's quirks intact: CRLF or bare CR
//! line breaks, form feeds between text runs, zero-width characters, soft
//! hyphens and long runs of blank lines. Each rule below is a pure
//! `&str → String` pass and [`normalize_page_text`] applies them in a fixed
//! order: line endings first so later passes only see `\n`.
//!
//! Normalisation never reorders or rewrites words; chunk offsets are computed
//! against the normalised text, so running it twice must be a no-op.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise the text of one extracted page.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF), form feeds become LF
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, NUL)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive newlines down to a single blank line
/// 5. Trim leading and trailing blank lines
pub fn normalize_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_lines(&s)
}

/// Lighter pass for text that is already markdown: only rules 1–3, so pipe
/// tables and paragraph breaks survive untouched.
pub fn normalize_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    trim_trailing_whitespace(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}'], "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{0000}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .split('\n')
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 5: Trim surrounding blank lines ─────────────────────────────────────

fn trim_blank_lines(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────
