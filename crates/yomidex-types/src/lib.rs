//! Shared types for card records and the tags attached to them.
//!
//! Every comparison in yomidex happens on *folded* text: NFKC-normalized,
//! trimmed, katakana mapped onto hiragana and Latin letters lowercased, so
//! `"ドウブツ"`, `"どうぶつ"` and `" どうぶつ "` all compare equal. [`Tag`]
//! keeps its folded forms private and re-derives them on every mutation.
//!
//! ```rust
//! use yomidex_types::{Frequency, Tag, fold};
//!
//! let tag = Tag::parse("動物（どうぶつ）").unwrap();
//! assert_eq!(tag.label(), "動物");
//! assert_eq!(tag.reading(), "どうぶつ");
//! assert_eq!(fold("ドウブツ"), tag.folded_reading());
//! assert_eq!(Frequency::parse("3").map(Frequency::get), Some(3));
//! ```

use std::fmt;

use serde::{Serialize, Serializer};
use unicode_normalization::UnicodeNormalization;

const KATAKANA_FOLD_START: u32 = 0x30A1;
const KATAKANA_FOLD_END: u32 = 0x30F6;
const KANA_OFFSET: u32 = 0x60;

/// NFKC-normalize and trim surrounding whitespace.
pub fn normalize(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    composed.trim().to_string()
}

/// Normalization used for header cells: [`normalize`] plus lowercase.
pub fn normalize_header(text: &str) -> String {
    normalize(text).to_lowercase()
}

/// Map katakana (`ァ`..=`ヶ`) onto the matching hiragana code points.
pub fn to_hiragana(text: &str) -> String {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if (KATAKANA_FOLD_START..=KATAKANA_FOLD_END).contains(&code) {
                char::from_u32(code - KANA_OFFSET).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// Canonical comparable form of `text`.
///
/// Idempotent: `fold(&fold(s)) == fold(s)`.
pub fn fold(text: &str) -> String {
    to_hiragana(&normalize(text)).to_lowercase()
}

/// True for CJK unified ideographs, including extension A and the
/// compatibility block.
pub fn is_ideograph(c: char) -> bool {
    matches!(c as u32, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF)
}

/// True if any character of `text` is an ideograph.
pub fn contains_ideograph(text: &str) -> bool {
    text.chars().any(is_ideograph)
}

/// Hiragana or katakana block, including the prolonged sound mark.
pub fn is_kana(c: char) -> bool {
    matches!(c as u32, 0x3040..=0x309F | 0x30A0..=0x30FF)
}

/// A card tag: orthographic label plus optional phonetic reading.
///
/// `key` is the identity used for deduplication and selection and always
/// equals the label.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Tag {
    key: String,
    label: String,
    reading: String,
    folded_label: String,
    folded_reading: String,
}

impl Tag {
    /// Build a tag from an already-normalized label and reading.
    pub fn new(label: impl Into<String>, reading: impl Into<String>) -> Self {
        let label = label.into();
        let reading = reading.into();
        Self {
            key: label.clone(),
            folded_label: fold(&label),
            folded_reading: fold(&reading),
            label,
            reading,
        }
    }

    /// Parse one raw tag token such as `犬`, `動物(どうぶつ)` or `猫（ねこ）`.
    ///
    /// Returns `None` when the token is empty after normalization.
    pub fn parse(token: &str) -> Option<Self> {
        let token = normalize(token);
        if token.is_empty() {
            return None;
        }
        match split_annotation(&token) {
            Some((label, reading)) => Some(Self::new(normalize(label), normalize(reading))),
            None => Some(Self::new(token, String::new())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Kana reading, or `""` when unknown.
    pub fn reading(&self) -> &str {
        &self.reading
    }

    pub fn folded_label(&self) -> &str {
        &self.folded_label
    }

    pub fn folded_reading(&self) -> &str {
        &self.folded_reading
    }

    pub fn has_reading(&self) -> bool {
        !self.reading.is_empty()
    }

    /// Replace the reading and re-derive its folded form.
    pub fn set_reading(&mut self, reading: impl Into<String>) {
        self.reading = reading.into();
        self.folded_reading = fold(&self.reading);
    }

    /// True if the folded label or folded reading equals `folded_query`.
    pub fn matches_exact(&self, folded_query: &str) -> bool {
        self.folded_label == folded_query
            || (!self.folded_reading.is_empty() && self.folded_reading == folded_query)
    }

    /// True if the folded label or folded reading starts with `folded_query`.
    pub fn matches_prefix(&self, folded_query: &str) -> bool {
        self.folded_label.starts_with(folded_query) || self.folded_reading.starts_with(folded_query)
    }

    /// True if the folded label or folded reading contains `folded_query`.
    pub fn matches_substring(&self, folded_query: &str) -> bool {
        self.folded_label.contains(folded_query) || self.folded_reading.contains(folded_query)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reading.is_empty() {
            f.write_str(&self.label)
        } else {
            write!(f, "{}({})", self.label, self.reading)
        }
    }
}

fn is_open_bracket(c: char) -> bool {
    c == '(' || c == '（'
}

fn is_close_bracket(c: char) -> bool {
    c == ')' || c == '）'
}

/// Split `label(reading)` into its two groups.
///
/// The token must end with a closing bracket. The reading may not contain a
/// closing bracket, so it is always the last bracket group; the label is the
/// shortest non-empty prefix that leaves a non-empty reading. Both ASCII and
/// full-width brackets are accepted and may be mixed.
pub fn split_annotation(token: &str) -> Option<(&str, &str)> {
    let close = token.chars().next_back().filter(|c| is_close_bracket(*c))?;
    let body = &token[..token.len() - close.len_utf8()];
    let after_last_close = body
        .char_indices()
        .filter(|(_, c)| is_close_bracket(*c))
        .last()
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);

    body.char_indices()
        .filter(|(idx, c)| *idx > 0 && *idx >= after_last_close && is_open_bracket(*c))
        .map(|(idx, c)| (&body[..idx], &body[idx + c.len_utf8()..]))
        .find(|(_, reading)| !reading.is_empty())
}

/// Card frequency rating, always within `1..=5`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Frequency(u8);

impl Frequency {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Accepts exactly one digit `1`..=`5` after normalization; anything
    /// else is "unknown" (`None`). Never clamps.
    pub fn parse(cell: &str) -> Option<Self> {
        let value = normalize(cell);
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c @ '1'..='5'), None) => Some(Self(c as u8 - b'0')),
            _ => None,
        }
    }

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Serialize for Frequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

/// One card row.
#[derive(Clone, Debug, Serialize)]
pub struct Record {
    /// Normalized prompt text; never empty.
    pub primary: String,
    /// Secondary notes, exactly as they appeared in the source cell.
    pub secondary: String,
    pub frequency: Option<Frequency>,
    pub tags: Vec<Tag>,
    /// Link consulted by the thumbnail collaborator, when the sheet has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Record {
    /// Secondary notes split on the `\\` / `¥¥` line convention.
    pub fn secondary_lines(&self) -> Vec<String> {
        let raw = normalize(&self.secondary);
        if raw.is_empty() {
            return Vec::new();
        }
        // NFKC already turned full-width yen signs into `¥`.
        raw.replace("¥¥", "\\\\")
            .split("\\\\")
            .map(normalize)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Iterate over the keys of this record's tags in order.
    pub fn tag_keys(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(Tag::key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_katakana_and_latin() {
        assert_eq!(fold("ドウブツ"), "どうぶつ");
        assert_eq!(fold("  Ｃａｔ "), "cat");
        assert_eq!(fold("ヴァイオリン"), "ゔぁいおりん");
        assert_eq!(fold("動物"), "動物");
        assert_eq!(fold("ｶﾀｶﾅ"), "かたかな");
    }

    #[test]
    fn fold_is_idempotent() {
        for sample in ["ドウブツ", "ＡＢＣ abc", "動物(どうぶつ)", "ｶﾞｷﾞ", "ﾃｽﾄ　", "İstanbul", "ー・ヶ"] {
            let once = fold(sample);
            assert_eq!(fold(&once), once, "sample {sample:?}");
        }
    }

    #[test]
    fn parses_annotated_tags() {
        let tag = Tag::parse("花(はな)").unwrap();
        assert_eq!(tag.label(), "花");
        assert_eq!(tag.key(), "花");
        assert_eq!(tag.reading(), "はな");
        assert_eq!(tag.folded_reading(), "はな");

        let plain = Tag::parse("犬").unwrap();
        assert_eq!(plain.label(), "犬");
        assert_eq!(plain.reading(), "");
        assert!(!plain.has_reading());

        assert_eq!(tag.to_string(), "花(はな)");
        assert_eq!(plain.to_string(), "犬");
    }

    #[test]
    fn parses_full_width_and_mixed_brackets() {
        let tag = Tag::parse("猫（ネコ）").unwrap();
        assert_eq!(tag.label(), "猫");
        assert_eq!(tag.reading(), "ネコ");
        assert_eq!(tag.folded_reading(), "ねこ");

        assert_eq!(split_annotation("犬（いぬ)"), Some(("犬", "いぬ")));
    }

    #[test]
    fn last_bracket_group_is_the_reading() {
        assert_eq!(split_annotation("A(x)(y)"), Some(("A(x)", "y")));
        assert_eq!(split_annotation("a(b(c)"), Some(("a", "b(c")));
        assert_eq!(split_annotation("(x)"), None);
        assert_eq!(split_annotation("a()"), None);
        assert_eq!(split_annotation("no brackets"), None);
    }

    #[test]
    fn empty_tokens_are_dropped() {
        assert!(Tag::parse("").is_none());
        assert!(Tag::parse("   ").is_none());
        assert!(Tag::parse("\u{3000}").is_none());
    }

    #[test]
    fn set_reading_refolds() {
        let mut tag = Tag::parse("動物").unwrap();
        assert_eq!(tag.folded_reading(), "");
        tag.set_reading("ドウブツ");
        assert_eq!(tag.reading(), "ドウブツ");
        assert_eq!(tag.folded_reading(), "どうぶつ");
        assert!(tag.matches_substring("うぶ"));
        assert!(tag.matches_exact("どうぶつ"));
    }

    #[test]
    fn frequency_domain() {
        assert_eq!(Frequency::parse("3").map(Frequency::get), Some(3));
        assert_eq!(Frequency::parse(" 5 ").map(Frequency::get), Some(5));
        assert_eq!(Frequency::parse("６"), None);
        assert_eq!(Frequency::parse("6"), None);
        assert_eq!(Frequency::parse("0"), None);
        assert_eq!(Frequency::parse(""), None);
        assert_eq!(Frequency::parse("12"), None);
        assert_eq!(Frequency::parse("x"), None);
        assert_eq!(Frequency::new(0), None);
        assert_eq!(Frequency::new(4).map(Frequency::get), Some(4));
    }

    #[test]
    fn splits_secondary_lines() {
        let record = Record {
            primary: "犬".into(),
            secondary: "いぬ\\\\dog￥￥ inu ".into(),
            frequency: None,
            tags: Vec::new(),
            source_url: None,
        };
        assert_eq!(record.secondary_lines(), vec!["いぬ", "dog", "inu"]);
    }

    #[test]
    fn serializes_unknown_frequency_as_null() {
        let record = Record {
            primary: "猫".into(),
            secondary: String::new(),
            frequency: None,
            tags: vec![Tag::parse("動物").unwrap()],
            source_url: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["frequency"].is_null());
        assert_eq!(value["tags"][0]["key"], "動物");
        assert!(value.get("source_url").is_none());
    }
}
