//! Kana reading resolution for tag labels containing kanji.
//!
//! Readings are filled in by the least speculative strategy that succeeds:
//! 1. Keep an existing reading (explicit `label(reading)` annotation).
//! 2. Exact match in a [`ReadingTable`].
//! 3. Greedy longest-match segmentation over the same table; any uncovered
//!    kanji aborts, so partial guesses are never stored.
//! 4. An external [`MorphAnalyzer`], loaded lazily through a
//!    [`SharedAnalyzer`]; if it cannot be loaded the tag keeps whatever the
//!    cheaper tiers produced, possibly nothing.
//!
//! A non-empty reading is never overwritten, so running the resolver twice
//! is a no-op the second time.
//!
//! # Example
//! ```rust
//! use yomidex_reading::{ReadingResolver, ReadingSource, ReadingTable};
//! use yomidex_types::Tag;
//!
//! let resolver = ReadingResolver::without_analyzer(ReadingTable::builtin());
//! let mut tag = Tag::parse("英語文法").unwrap();
//! assert_eq!(resolver.resolve_tag(&mut tag), Some(ReadingSource::Segmentation));
//! assert_eq!(tag.reading(), "えいごぶんぽう");
//! ```
//!
//! For a runnable demo, see `cargo run -p yomidex-reading --example lookup -- [--table <file>] <word>...`.

mod analyzer;
mod table;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use yomidex_types::{Record, Tag, contains_ideograph};

#[cfg(feature = "lindera")]
pub use analyzer::LinderaAnalyzer;
pub use analyzer::{MorphAnalyzer, Morpheme, SharedAnalyzer, UNKNOWN_FIELD, reading_from_morphemes};
pub use table::ReadingTable;

/// Which tier produced a tag's reading.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReadingSource {
    /// The tag already carried a reading.
    Annotation,
    Dictionary,
    Segmentation,
    Analyzer,
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadingSource::Annotation => "annotation",
            ReadingSource::Dictionary => "dictionary",
            ReadingSource::Segmentation => "segmentation",
            ReadingSource::Analyzer => "analyzer",
        })
    }
}

/// Per-tier counts from one [`ReadingResolver::resolve_records`] pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResolveStats {
    pub annotated: usize,
    pub dictionary: usize,
    pub segmented: usize,
    pub analyzed: usize,
    /// Kanji labels left without a reading.
    pub unresolved: usize,
}

impl ResolveStats {
    fn record(&mut self, source: ReadingSource) {
        match source {
            ReadingSource::Annotation => self.annotated += 1,
            ReadingSource::Dictionary => self.dictionary += 1,
            ReadingSource::Segmentation => self.segmented += 1,
            ReadingSource::Analyzer => self.analyzed += 1,
        }
    }
}

/// Fills in missing readings, cheapest tier first.
#[derive(Debug)]
pub struct ReadingResolver {
    table: ReadingTable,
    analyzer: Arc<SharedAnalyzer>,
}

impl ReadingResolver {
    pub fn new(table: ReadingTable, analyzer: Arc<SharedAnalyzer>) -> Self {
        Self { table, analyzer }
    }

    /// Resolver limited to tiers 1–3.
    pub fn without_analyzer(table: ReadingTable) -> Self {
        Self::new(table, Arc::new(SharedAnalyzer::unavailable()))
    }

    pub fn table(&self) -> &ReadingTable {
        &self.table
    }

    pub fn analyzer(&self) -> &Arc<SharedAnalyzer> {
        &self.analyzer
    }

    /// A tag needs resolution when it has no reading and its label has kanji.
    pub fn needs_reading(tag: &Tag) -> bool {
        !tag.has_reading() && contains_ideograph(tag.label())
    }

    /// Tiers 2 and 3 for a bare label.
    pub fn lookup(&self, label: &str) -> Option<(String, ReadingSource)> {
        if let Some(reading) = self.table.get(label) {
            return Some((reading.to_string(), ReadingSource::Dictionary));
        }
        self.table
            .segment(label)
            .map(|reading| (reading, ReadingSource::Segmentation))
    }

    /// Run the synchronous tiers on one tag.
    ///
    /// Returns the tier that supplied the tag's reading, or `None` if the tag
    /// still has none (either it needs the analyzer or has no kanji).
    pub fn resolve_tag(&self, tag: &mut Tag) -> Option<ReadingSource> {
        if tag.has_reading() {
            return Some(ReadingSource::Annotation);
        }
        if !contains_ideograph(tag.label()) {
            return None;
        }
        let (reading, source) = self.lookup(tag.label())?;
        tag.set_reading(reading);
        Some(source)
    }

    /// Resolve every tag of every record: tiers 1–3 immediately, then the
    /// analyzer once over whatever is still pending.
    pub async fn resolve_records(&self, records: &mut [Record]) -> ResolveStats {
        let mut stats = ResolveStats::default();
        let mut pending: Vec<(usize, usize)> = Vec::new();

        for (record_idx, record) in records.iter_mut().enumerate() {
            for (tag_idx, tag) in record.tags.iter_mut().enumerate() {
                match self.resolve_tag(tag) {
                    Some(source) => stats.record(source),
                    None if Self::needs_reading(tag) => pending.push((record_idx, tag_idx)),
                    None => {}
                }
            }
        }

        if !pending.is_empty() {
            debug!("{} tags pending analyzer resolution", pending.len());
            match self.analyzer.get().await {
                Some(analyzer) => {
                    let mut memo: HashMap<String, Option<String>> = HashMap::new();
                    for (record_idx, tag_idx) in pending {
                        let tag = &mut records[record_idx].tags[tag_idx];
                        let reading = memo
                            .entry(tag.label().to_string())
                            .or_insert_with(|| analyze(analyzer.as_ref(), tag.label()))
                            .clone();
                        match reading {
                            Some(reading) => {
                                tag.set_reading(reading);
                                stats.record(ReadingSource::Analyzer);
                            }
                            None => stats.unresolved += 1,
                        }
                    }
                }
                None => stats.unresolved += pending.len(),
            }
        }

        info!(
            "readings: {} annotated, {} dictionary, {} segmented, {} analyzer, {} unresolved",
            stats.annotated, stats.dictionary, stats.segmented, stats.analyzed, stats.unresolved
        );
        stats
    }
}

fn analyze(analyzer: &dyn MorphAnalyzer, label: &str) -> Option<String> {
    match analyzer.tokenize(label) {
        Ok(morphemes) if !morphemes.is_empty() => {
            let reading = reading_from_morphemes(&morphemes);
            (!reading.is_empty()).then_some(reading)
        }
        Ok(_) => None,
        Err(err) => {
            warn!("analyzer failed on {label:?}: {err:#}");
            None
        }
    }
}
