use std::collections::{HashMap, HashSet};

use icu::collator::Collator;
use icu::collator::options::CollatorOptions;
use icu::locale::locale;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use yomidex_types::{Record, Tag, fold};

pub const DEFAULT_SUGGESTION_LIMIT: usize = 12;

/// How free-text queries are matched against folded tag forms.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Substring,
    Prefix,
}

impl MatchMode {
    pub fn matches(self, tag: &Tag, folded_query: &str) -> bool {
        match self {
            MatchMode::Substring => tag.matches_substring(folded_query),
            MatchMode::Prefix => tag.matches_prefix(folded_query),
        }
    }
}

/// Deduplicated tag directory, sorted by Japanese collation of the label.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    tags: Vec<Tag>,
    by_key: HashMap<String, usize>,
}

impl TagIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect one canonical tag per key. Records are walked in order, so
    /// the first occurrence of a key supplies its label and reading.
    pub fn build(records: &[Record]) -> Self {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut tags = Vec::new();
        let mut occurrences = 0usize;
        for record in records {
            for tag in &record.tags {
                occurrences += 1;
                if seen.insert(tag.key()) {
                    tags.push(tag.clone());
                }
            }
        }

        sort_by_label(&mut tags);
        let by_key = tags
            .iter()
            .enumerate()
            .map(|(idx, tag)| (tag.key().to_string(), idx))
            .collect();
        info!("indexed {} tags from {occurrences} occurrences", tags.len());
        Self { tags, by_key }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// All tags in collation order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.by_key.get(key).and_then(|idx| self.tags.get(*idx))
    }

    /// First tag (in collation order) whose folded label or reading equals
    /// the folded query.
    pub fn find_exact(&self, query: &str) -> Option<&Tag> {
        let folded = fold(query);
        if folded.is_empty() {
            return None;
        }
        self.tags.iter().find(|tag| tag.matches_exact(&folded))
    }

    /// Up to `limit` tags matching the folded query under `mode`.
    pub fn candidates(&self, query: &str, limit: usize, mode: MatchMode) -> Vec<&Tag> {
        let folded = fold(query);
        if folded.is_empty() {
            return Vec::new();
        }
        self.tags
            .iter()
            .filter(|tag| mode.matches(tag, &folded))
            .take(limit)
            .collect()
    }
}

fn sort_by_label(tags: &mut [Tag]) {
    match Collator::try_new(locale!("ja").into(), CollatorOptions::default()) {
        Ok(collator) => tags.sort_by(|a, b| collator.compare(a.label(), b.label())),
        Err(err) => {
            warn!("japanese collation unavailable ({err}); sorting tags by code point");
            tags.sort_by(|a, b| a.label().cmp(b.label()));
        }
    }
}
