//! Seam to an external morphological analyzer and its lazy, shared handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use yomidex_types::{normalize, to_hiragana};

/// Field value analyzers use for "no information".
pub const UNKNOWN_FIELD: &str = "*";

/// One word-like unit reported by an analyzer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Morpheme {
    pub surface: String,
    pub reading: Option<String>,
    pub pronunciation: Option<String>,
}

impl Morpheme {
    /// Reading, else pronunciation, else the surface form.
    pub fn kana(&self) -> String {
        [self.reading.as_deref(), self.pronunciation.as_deref()]
            .into_iter()
            .flatten()
            .map(normalize)
            .find(|field| !field.is_empty() && field != UNKNOWN_FIELD)
            .unwrap_or_else(|| normalize(&self.surface))
    }
}

/// Splits text into morphemes.
pub trait MorphAnalyzer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<Morpheme>>;
}

/// Concatenate per-morpheme kana and fold to hiragana.
pub fn reading_from_morphemes(morphemes: &[Morpheme]) -> String {
    let joined: String = morphemes.iter().map(Morpheme::kana).collect();
    to_hiragana(&joined)
}

type LoadFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn MorphAnalyzer>>> + Send>>;
type Loader = Box<dyn Fn() -> LoadFuture + Send + Sync>;

/// Process-wide analyzer handle, initialized on first demand.
///
/// Every caller awaiting [`SharedAnalyzer::get`] before initialization
/// finishes shares the same in-flight load. A failed load is remembered as
/// "unavailable" and never retried.
pub struct SharedAnalyzer {
    cell: OnceCell<Option<Arc<dyn MorphAnalyzer>>>,
    loader: Option<Loader>,
}

impl SharedAnalyzer {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn MorphAnalyzer>>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Some(Box::new(move || -> LoadFuture { Box::pin(loader()) })),
        }
    }

    /// A handle that is already initialized with `analyzer`.
    pub fn ready(analyzer: Arc<dyn MorphAnalyzer>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Some(analyzer))),
            loader: None,
        }
    }

    /// A handle for deployments without an analyzer.
    pub fn unavailable() -> Self {
        Self {
            cell: OnceCell::new_with(Some(None)),
            loader: None,
        }
    }

    /// Resolve the analyzer, loading it if this is the first request.
    pub async fn get(&self) -> Option<Arc<dyn MorphAnalyzer>> {
        self.cell
            .get_or_init(|| async {
                let loader = self.loader.as_ref()?;
                match loader().await {
                    Ok(analyzer) => {
                        info!("morphological analyzer ready");
                        Some(analyzer)
                    }
                    Err(err) => {
                        warn!("morphological analyzer unavailable: {err:#}");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// `"pending"`, `"ready"` or `"unavailable"`.
    pub fn state(&self) -> &'static str {
        match self.cell.get() {
            None => "pending",
            Some(Some(_)) => "ready",
            Some(None) => "unavailable",
        }
    }
}

impl std::fmt::Debug for SharedAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedAnalyzer")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(feature = "lindera")]
pub use self::lindera_impl::LinderaAnalyzer;

#[cfg(feature = "lindera")]
mod lindera_impl {
    use anyhow::Result;
    use lindera::dictionary::{DictionaryKind, load_dictionary_from_kind};
    use lindera::mode::Mode;
    use lindera::segmenter::Segmenter;
    use lindera::tokenizer::Tokenizer;

    use super::{MorphAnalyzer, Morpheme};

    // IPADIC detail columns.
    const READING_FIELD: usize = 7;
    const PRONUNCIATION_FIELD: usize = 8;

    /// Analyzer backed by Lindera with the embedded IPADIC dictionary.
    pub struct LinderaAnalyzer {
        tokenizer: Tokenizer,
    }

    impl LinderaAnalyzer {
        pub fn new() -> Result<Self> {
            let dictionary = load_dictionary_from_kind(DictionaryKind::IPADIC)?;
            let segmenter = Segmenter::new(Mode::Normal, dictionary, None);
            Ok(Self {
                tokenizer: Tokenizer::new(segmenter),
            })
        }
    }

    impl MorphAnalyzer for LinderaAnalyzer {
        fn tokenize(&self, text: &str) -> Result<Vec<Morpheme>> {
            let mut tokens = self.tokenizer.tokenize(text)?;
            Ok(tokens
                .iter_mut()
                .map(|token| {
                    let surface = token.surface.to_string();
                    let details = token.details();
                    let field = |idx: usize| details.get(idx).map(|s| s.to_string());
                    Morpheme {
                        surface,
                        reading: field(READING_FIELD),
                        pronunciation: field(PRONUNCIATION_FIELD),
                    }
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Echo;

    impl MorphAnalyzer for Echo {
        fn tokenize(&self, text: &str) -> Result<Vec<Morpheme>> {
            Ok(vec![Morpheme {
                surface: text.to_string(),
                ..Morpheme::default()
            }])
        }
    }

    fn morpheme(surface: &str, reading: Option<&str>, pronunciation: Option<&str>) -> Morpheme {
        Morpheme {
            surface: surface.into(),
            reading: reading.map(Into::into),
            pronunciation: pronunciation.map(Into::into),
        }
    }

    #[test]
    fn morpheme_kana_prefers_reading_then_pronunciation() {
        assert_eq!(morpheme("東京", Some("トウキョウ"), Some("トーキョー")).kana(), "トウキョウ");
        assert_eq!(morpheme("東京", Some("*"), Some("トーキョー")).kana(), "トーキョー");
        assert_eq!(morpheme("ABC", Some("*"), None).kana(), "ABC");
        assert_eq!(morpheme("x", None, None).kana(), "x");
    }

    #[test]
    fn joins_and_folds_morpheme_readings() {
        let morphemes = vec![
            morpheme("動物", Some("ドウブツ"), None),
            morpheme("園", Some("エン"), None),
        ];
        assert_eq!(reading_from_morphemes(&morphemes), "どうぶつえん");
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_initialization() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let shared = Arc::new(SharedAnalyzer::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, anyhow::Error>(Arc::new(Echo) as Arc<dyn MorphAnalyzer>)
            }
        }));
        assert!(!shared.is_initialized());
        assert_eq!(shared.state(), "pending");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.get().await.is_some() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert!(shared.get().await.is_some());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(shared.is_initialized());
        assert_eq!(shared.state(), "ready");
    }

    #[tokio::test]
    async fn failed_initialization_is_memoized() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let shared = SharedAnalyzer::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Arc<dyn MorphAnalyzer>, _>(anyhow::anyhow!("dictionary download failed"))
            }
        });
        assert!(shared.get().await.is_none());
        assert!(shared.get().await.is_none());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_handle_never_loads() {
        let shared = SharedAnalyzer::unavailable();
        assert!(shared.is_initialized());
        assert!(shared.get().await.is_none());
    }
}
