use std::sync::Arc;

use anyhow::Result;
use yomidex_reading::{MorphAnalyzer, Morpheme, ReadingResolver, ReadingTable, SharedAnalyzer};
use yomidex_sheet::records_from_text;

const SHEET: &str = "メモ,サブメモ,頻度,タグ\n\
犬,いぬ,3,動物(どうぶつ)、ペット\n\
猫,ねこ,9,動物\n\
パンダ,,5,動物園、中国\n";

struct Fixed;

impl MorphAnalyzer for Fixed {
    fn tokenize(&self, text: &str) -> Result<Vec<Morpheme>> {
        let reading = match text {
            "動物園" => "ドウブツエン",
            "中国" => "チュウゴク",
            other => other,
        };
        Ok(vec![Morpheme {
            surface: text.to_string(),
            reading: Some(reading.to_string()),
            pronunciation: None,
        }])
    }
}

#[tokio::test]
async fn resolves_every_kanji_tag_in_a_sheet() {
    let mut records = records_from_text(SHEET);
    let resolver = ReadingResolver::new(
        ReadingTable::builtin(),
        Arc::new(SharedAnalyzer::ready(Arc::new(Fixed))),
    );
    let stats = resolver.resolve_records(&mut records).await;

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].tags[0].reading(), "どうぶつ");
    assert_eq!(records[1].tags[0].reading(), "どうぶつ");
    assert_eq!(records[2].tags[0].reading(), "どうぶつえん");
    assert_eq!(records[2].tags[1].folded_reading(), "ちゅうごく");
    assert_eq!(stats.unresolved, 0);
    assert_eq!(stats.analyzed, 2);
}

#[tokio::test]
async fn lazily_loaded_analyzer_is_shared_across_passes() {
    let shared = Arc::new(SharedAnalyzer::new(|| async {
        Ok::<_, anyhow::Error>(Arc::new(Fixed) as Arc<dyn MorphAnalyzer>)
    }));
    let resolver = ReadingResolver::new(ReadingTable::builtin(), Arc::clone(&shared));

    let mut first = records_from_text(SHEET);
    let mut second = records_from_text(SHEET);
    let (a, b) = tokio::join!(
        resolver.resolve_records(&mut first),
        resolver.resolve_records(&mut second)
    );
    assert_eq!(a, b);
    assert!(shared.is_initialized());
    assert_eq!(first[2].tags[0].reading(), second[2].tags[0].reading());
}
