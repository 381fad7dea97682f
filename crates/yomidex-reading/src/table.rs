use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;
use yomidex_types::{is_kana, normalize, to_hiragana};

/// Common vocabulary shipped with the crate. Single characters double as
/// building blocks for compound segmentation.
const BUILTIN: &[(&str, &str)] = &[
    ("動物", "どうぶつ"),
    ("植物", "しょくぶつ"),
    ("日本", "にほん"),
    ("日本語", "にほんご"),
    ("英語", "えいご"),
    ("外国", "がいこく"),
    ("料理", "りょうり"),
    ("音楽", "おんがく"),
    ("映画", "えいが"),
    ("歴史", "れきし"),
    ("地理", "ちり"),
    ("数学", "すうがく"),
    ("科学", "かがく"),
    ("天気", "てんき"),
    ("季節", "きせつ"),
    ("食べ物", "たべもの"),
    ("飲み物", "のみもの"),
    ("乗り物", "のりもの"),
    ("家族", "かぞく"),
    ("仕事", "しごと"),
    ("旅行", "りょこう"),
    ("文化", "ぶんか"),
    ("単語", "たんご"),
    ("文法", "ぶんぽう"),
    ("漢字", "かんじ"),
    ("会話", "かいわ"),
    ("基本", "きほん"),
    ("初級", "しょきゅう"),
    ("中級", "ちゅうきゅう"),
    ("上級", "じょうきゅう"),
    ("名詞", "めいし"),
    ("動詞", "どうし"),
    ("形容詞", "けいようし"),
    ("副詞", "ふくし"),
    ("時間", "じかん"),
    ("数字", "すうじ"),
    ("犬", "いぬ"),
    ("猫", "ねこ"),
    ("花", "はな"),
    ("鳥", "とり"),
    ("魚", "さかな"),
    ("山", "やま"),
    ("川", "かわ"),
    ("海", "うみ"),
    ("空", "そら"),
    ("色", "いろ"),
    ("体", "からだ"),
];

/// Known label→reading pairs with longest-prefix lookup.
#[derive(Clone, Debug, Default)]
pub struct ReadingTable {
    readings: HashMap<String, String>,
    // Keys ordered by descending char count; equal lengths keep insertion order.
    by_length: Vec<(usize, String)>,
}

impl ReadingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in vocabulary.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (label, reading) in BUILTIN {
            table.insert(label, reading);
        }
        table
    }

    /// Built-in vocabulary extended with a user file of
    /// `label<TAB>reading` lines. File entries override built-in ones.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut table = Self::builtin();
        table.extend_from_file(path)?;
        Ok(table)
    }

    /// Add entries from a `label<TAB>reading` file.
    ///
    /// Blank lines and `#` comments are ignored; malformed lines are skipped
    /// with a warning.
    pub fn extend_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open reading table {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut added = 0usize;
        for (lineno, line) in reader.lines().enumerate() {
            let line =
                line.with_context(|| format!("read line {} in {}", lineno + 1, path.display()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let split = trimmed
                .split_once('\t')
                .or_else(|| trimmed.split_once(char::is_whitespace));
            match split {
                Some((label, reading)) if self.insert(label, reading) => added += 1,
                _ => warn!(
                    "skipping malformed reading entry at {}:{}",
                    path.display(),
                    lineno + 1
                ),
            }
        }
        Ok(added)
    }

    /// Insert or replace one entry. Returns `false` if either side is blank.
    pub fn insert(&mut self, label: &str, reading: &str) -> bool {
        let label = normalize(label);
        let reading = to_hiragana(&normalize(reading));
        if label.is_empty() || reading.is_empty() {
            return false;
        }
        if self.readings.insert(label.clone(), reading).is_none() {
            let len = label.chars().count();
            let at = self.by_length.partition_point(|(other, _)| *other >= len);
            self.by_length.insert(at, (len, label));
        }
        true
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.readings.get(label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Longest key that `text` starts with, paired with its reading.
    pub fn longest_prefix<'a>(&'a self, text: &str) -> Option<(&'a str, &'a str)> {
        self.by_length
            .iter()
            .map(|(_, key)| key.as_str())
            .find(|key| text.starts_with(key))
            .and_then(|key| self.readings.get(key).map(|r| (key, r.as_str())))
    }

    /// Greedy longest-match segmentation of a compound label.
    ///
    /// Kana and ASCII pass through unchanged (katakana folded to hiragana).
    /// Any other character not covered by a key aborts the whole attempt:
    /// a partial reading is never returned.
    pub fn segment(&self, label: &str) -> Option<String> {
        let mut out = String::with_capacity(label.len() * 2);
        let mut rest = label;
        while let Some(c) = rest.chars().next() {
            if let Some((key, reading)) = self.longest_prefix(rest) {
                out.push_str(reading);
                rest = &rest[key.len()..];
            } else if is_kana(c) || c.is_ascii() {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            } else {
                return None;
            }
        }
        let out = to_hiragana(&out);
        (!out.is_empty()).then_some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn prefers_the_longest_key() {
        let mut table = ReadingTable::new();
        table.insert("日本", "にほん");
        table.insert("日", "ひ");
        table.insert("日本語", "にほんご");
        assert_eq!(table.longest_prefix("日本語学"), Some(("日本語", "にほんご")));
        assert_eq!(table.longest_prefix("日曜"), Some(("日", "ひ")));
        assert_eq!(table.longest_prefix("月曜"), None);
    }

    #[test]
    fn segments_compounds_and_passes_kana_through() {
        let table = ReadingTable::builtin();
        assert_eq!(table.segment("英語文法").as_deref(), Some("えいごぶんぽう"));
        assert_eq!(table.segment("犬とネコ").as_deref(), Some("いぬとねこ"));
        assert_eq!(table.segment("N5単語").as_deref(), Some("N5たんご"));
    }

    #[test]
    fn segmentation_aborts_on_unknown_ideograph() {
        let table = ReadingTable::builtin();
        assert_eq!(table.segment("動物園"), None);
        assert_eq!(table.segment("園"), None);
    }

    #[test]
    fn insert_normalizes_and_rejects_blanks() {
        let mut table = ReadingTable::new();
        assert!(table.insert(" 桜 ", "サクラ"));
        assert_eq!(table.get("桜"), Some("さくら"));
        assert!(!table.insert("", "x"));
        assert!(!table.insert("x", "  "));
        assert!(table.insert("桜", "おう"));
        assert_eq!(table.get("桜"), Some("おう"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn loads_entries_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "# custom readings").unwrap();
        writeln!(file, "動物園\tどうぶつえん").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "桜 さくら").unwrap();
        writeln!(file, "broken").unwrap();

        let table = ReadingTable::load(file.path()).expect("load table");
        assert_eq!(table.get("動物園"), Some("どうぶつえん"));
        assert_eq!(table.get("桜"), Some("さくら"));
        assert_eq!(table.get("犬"), Some("いぬ"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReadingTable::load(dir.path().join("absent.tsv")).is_err());
    }
}
