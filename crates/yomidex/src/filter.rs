use yomidex_types::{Frequency, Record, fold, normalize};

use crate::index::{MatchMode, TagIndex};

/// Predicate over records built from the viewer's query state.
///
/// Selected tags and the free-text query are mutually exclusive: once any
/// tag is selected the query is ignored, even if it is still set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchFilter {
    lo: u8,
    hi: u8,
    selected: Vec<String>,
    query: String,
    mode: MatchMode,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self::new(Frequency::MIN, Frequency::MAX)
    }
}

impl SearchFilter {
    /// Bounds may arrive in either order.
    pub fn new(bound_a: u8, bound_b: u8) -> Self {
        Self {
            lo: bound_a.min(bound_b),
            hi: bound_a.max(bound_b),
            selected: Vec::new(),
            query: String::new(),
            mode: MatchMode::default(),
        }
    }

    /// Require every one of `keys` (AND semantics). Blank keys are ignored.
    pub fn with_selected<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            let key = normalize(key.as_ref());
            if !key.is_empty() && !self.selected.contains(&key) {
                self.selected.push(key);
            }
        }
        self
    }

    pub fn with_query(mut self, raw: &str) -> Self {
        self.query = fold(raw);
        self
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Turn a free-text query that exactly names a tag into a selection of
    /// that tag. No-op when a selection already exists or nothing matches.
    pub fn commit(mut self, index: &TagIndex) -> Self {
        if self.selected.is_empty()
            && let Some(tag) = index.find_exact(&self.query)
        {
            self.selected.push(tag.key().to_string());
        }
        self
    }

    pub fn bounds(&self) -> (u8, u8) {
        (self.lo, self.hi)
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Folded free-text query; empty when inactive.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(freq) = record.frequency
            && !(self.lo..=self.hi).contains(&freq.get())
        {
            return false;
        }
        if !self.selected.is_empty() {
            return self
                .selected
                .iter()
                .all(|key| record.tag_keys().any(|k| k == key));
        }
        if !self.query.is_empty() {
            return record
                .tags
                .iter()
                .any(|tag| self.mode.matches(tag, &self.query));
        }
        true
    }

    /// Matching records in their original order.
    pub fn apply<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yomidex_sheet::records_from_text;

    const SHEET: &str = "メモ,頻度,タグ\n犬,3,動物(どうぶつ)\n猫,9,動物\n";

    fn primaries<'a>(records: &[&'a Record]) -> Vec<&'a str> {
        records.iter().map(|r| r.primary.as_str()).collect()
    }

    #[test]
    fn selected_tag_respects_frequency_bounds() {
        let records = records_from_text(SHEET);
        let all = SearchFilter::new(1, 5).with_selected(["動物"]);
        assert_eq!(primaries(&all.apply(&records)), vec!["犬", "猫"]);

        // Unknown frequency passes any bound; 3 falls outside [4, 5].
        let high = SearchFilter::new(4, 5).with_selected(["動物"]);
        assert_eq!(primaries(&high.apply(&records)), vec!["猫"]);
    }

    #[test]
    fn bounds_are_order_normalized() {
        let filter = SearchFilter::new(5, 2);
        assert_eq!(filter.bounds(), (2, 5));
        let records = records_from_text("memo,freq\na,1\nb,2\nc,5\nd,\n");
        assert_eq!(primaries(&filter.apply(&records)), vec!["b", "c", "d"]);
    }

    #[test]
    fn selection_uses_and_semantics() {
        let records = records_from_text("memo,tags\na,\"x,y\"\nb,x\nc,\"y,x,z\"\n");
        let filter = SearchFilter::default().with_selected(["x", "y", " "]);
        assert_eq!(filter.selected(), ["x", "y"]);
        assert_eq!(primaries(&filter.apply(&records)), vec!["a", "c"]);
    }

    #[test]
    fn query_matches_folded_reading_as_substring() {
        let records = records_from_text(SHEET);
        let filter = SearchFilter::default().with_query("ドウ");
        assert_eq!(filter.query(), "どう");
        // Only the first row carries the reading.
        assert_eq!(primaries(&filter.apply(&records)), vec!["犬"]);

        let inner = SearchFilter::default().with_query("ぶつ");
        assert_eq!(primaries(&inner.apply(&records)), vec!["犬"]);
        let prefix = inner.with_mode(MatchMode::Prefix);
        assert!(prefix.apply(&records).is_empty());
    }

    #[test]
    fn selection_suppresses_query() {
        let records = records_from_text("memo,tags\na,x\nb,y\n");
        let filter = SearchFilter::default()
            .with_query("y")
            .with_selected(["x"]);
        assert_eq!(primaries(&filter.apply(&records)), vec!["a"]);
    }

    #[test]
    fn empty_state_passes_everything_in_order() {
        let records = records_from_text("memo\nc\na\nb\n");
        let filtered = SearchFilter::default().apply(&records);
        assert_eq!(primaries(&filtered), vec!["c", "a", "b"]);
    }

    #[test]
    fn commit_selects_an_exactly_matching_tag() {
        let records = records_from_text(SHEET);
        let index = TagIndex::build(&records);

        let committed = SearchFilter::default().with_query("どうぶつ").commit(&index);
        assert_eq!(committed.selected(), ["動物"]);
        assert_eq!(primaries(&committed.apply(&records)), vec!["犬", "猫"]);

        let partial = SearchFilter::default().with_query("どう").commit(&index);
        assert!(partial.selected().is_empty());
    }
}
