//! Read card spreadsheets exported as comma-delimited text.
//!
//! Two stages, both infallible:
//! 1. [`parse_rows`] splits text into rows of cells using the permissive
//!    quoting rules of the upstream export: a `"` anywhere toggles quoted
//!    mode, `""` inside quotes is a literal quote, and rows whose cells are
//!    all blank vanish.
//! 2. [`map_records`] treats the first row as a header, locates columns by
//!    synonym (falling back to fixed positions) and builds [`Record`]s.
//!
//! Only [`load_records`] touches the filesystem and can fail.
//!
//! # Example
//! ```rust
//! use yomidex_sheet::records_from_text;
//!
//! let records = records_from_text("メモ,頻度,タグ\n犬,3,動物(どうぶつ)\n猫,9,動物\n");
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].frequency.map(|f| f.get()), Some(3));
//! assert!(records[1].frequency.is_none());
//! ```
//!
//! For a runnable demo, see `cargo run -p yomidex-sheet --example stats -- <file.csv>`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use yomidex_types::{Frequency, Record, Tag, normalize, normalize_header};

const PRIMARY_HEADERS: &[&str] = &["メモ", "memo", "答え", "answer"];
const SECONDARY_HEADERS: &[&str] = &["サブメモ", "submemo", "sub memo"];
const FREQUENCY_HEADERS: &[&str] = &["頻度", "freq", "frequency"];
const TAG_HEADERS: &[&str] = &["タグ", "tag", "tags"];
const SOURCE_URL_HEADERS: &[&str] = &["url", "link", "source", "リンク"];

const TAG_SEPARATORS: &[char] = &[',', '、'];

/// Split delimited text into rows of raw cells.
///
/// Never fails; malformed input still yields some row sequence. Cells are
/// returned untrimmed.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => row.push(std::mem::take(&mut cell)),
            '\r' | '\n' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut cell));
                flush_row(&mut rows, std::mem::take(&mut row));
            }
            other => cell.push(other),
        }
    }

    row.push(cell);
    flush_row(&mut rows, row);
    rows
}

fn flush_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().any(|cell| !normalize(cell).is_empty()) {
        rows.push(row);
    }
}

/// Column positions for each logical field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ColumnMap {
    pub primary: usize,
    pub secondary: usize,
    pub frequency: usize,
    pub tags: usize,
    /// No positional fallback: absent unless a header names it.
    pub source_url: Option<usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            primary: 0,
            secondary: 1,
            frequency: 2,
            tags: 3,
            source_url: None,
        }
    }
}

impl ColumnMap {
    /// Locate columns in a header row.
    pub fn resolve(header: &[String]) -> Self {
        // Later duplicates overwrite earlier ones, so the right-most wins.
        let positions: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .map(|(idx, cell)| (normalize_header(cell), idx))
            .collect();
        let find = |synonyms: &[&str]| {
            synonyms
                .iter()
                .find_map(|name| positions.get(&normalize_header(name)).copied())
        };

        let fallback = Self::default();
        Self {
            primary: find(PRIMARY_HEADERS).unwrap_or(fallback.primary),
            secondary: find(SECONDARY_HEADERS).unwrap_or(fallback.secondary),
            frequency: find(FREQUENCY_HEADERS).unwrap_or(fallback.frequency),
            tags: find(TAG_HEADERS).unwrap_or(fallback.tags),
            source_url: find(SOURCE_URL_HEADERS),
        }
    }
}

/// Map parsed rows (header first) to records.
///
/// Rows whose primary text is blank are dropped.
pub fn map_records(rows: &[Vec<String>]) -> Vec<Record> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };
    let columns = ColumnMap::resolve(header);
    data.iter()
        .filter_map(|row| map_record(row, &columns))
        .collect()
}

fn map_record(row: &[String], columns: &ColumnMap) -> Option<Record> {
    let cell = |idx: usize| row.get(idx).map(String::as_str).unwrap_or("");

    let primary = normalize(cell(columns.primary));
    if primary.is_empty() {
        return None;
    }

    let source_url = columns
        .source_url
        .map(|idx| normalize(cell(idx)))
        .filter(|url| !url.is_empty());

    Some(Record {
        primary,
        secondary: cell(columns.secondary).to_string(),
        frequency: Frequency::parse(cell(columns.frequency)),
        tags: parse_tags(cell(columns.tags)),
        source_url,
    })
}

/// Split a tags cell on `,` / `、` and parse each token, skipping blanks.
pub fn parse_tags(cell: &str) -> Vec<Tag> {
    normalize(cell)
        .split(TAG_SEPARATORS)
        .filter_map(Tag::parse)
        .collect()
}

/// Parse a whole sheet export into records.
pub fn records_from_text(text: &str) -> Vec<Record> {
    map_records(&parse_rows(text))
}

/// Read a UTF-8 sheet export from disk.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).with_context(|| format!("read sheet {}", path.display()))?;
    Ok(records_from_text(&text))
}
