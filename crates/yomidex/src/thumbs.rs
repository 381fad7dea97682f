use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 4;

/// Resolves a record's source URL to a preview image URL.
pub trait ThumbnailLookup: Send + Sync {
    fn lookup<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}

/// oEmbed provider lookup: `GET {endpoint}?url=..&format=json`.
#[derive(Debug, Clone)]
pub struct OembedLookup {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct OembedResponse {
    thumbnail_url: Option<String>,
}

impl OembedLookup {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Option<String>, reqwest::Error> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url), ("format", "json")])
            .send()
            .await?
            .error_for_status()?;
        let body: OembedResponse = response.json().await?;
        Ok(body.thumbnail_url.filter(|u| !u.trim().is_empty()))
    }
}

impl ThumbnailLookup for OembedLookup {
    fn lookup<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            match self.fetch(url).await {
                Ok(thumbnail) => thumbnail,
                Err(err) => {
                    debug!("no thumbnail for {url}: {err}");
                    None
                }
            }
        })
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Pending,
    Done(Option<String>),
}

/// Thumbnail cache keyed by source URL.
///
/// Each distinct URL is looked up at most once for the lifetime of the
/// store, including URLs whose lookup found nothing.
#[derive(Clone)]
pub struct ThumbnailStore {
    slots: Arc<DashMap<String, Slot>>,
    lookup: Option<Arc<dyn ThumbnailLookup>>,
    workers: usize,
}

impl ThumbnailStore {
    pub fn new(lookup: Arc<dyn ThumbnailLookup>, workers: usize) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            lookup: Some(lookup),
            workers: workers.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            lookup: None,
            workers: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lookup.is_some()
    }

    pub fn get(&self, url: &str) -> Option<String> {
        match self.slots.get(url).as_deref() {
            Some(Slot::Done(thumbnail)) => thumbnail.clone(),
            _ => None,
        }
    }

    /// URLs whose lookup has finished.
    pub fn resolved(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Done(_)))
            .count()
    }

    /// Look up every URL not seen before, with a fixed number of workers
    /// pulling from a shared cursor. Returns how many URLs were claimed.
    pub async fn enrich(&self, urls: Vec<String>) -> usize {
        let Some(lookup) = self.lookup.clone() else {
            return 0;
        };
        let claimed: Vec<String> = urls
            .into_iter()
            .filter(|url| match self.slots.entry(url.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(Slot::Pending);
                    true
                }
            })
            .collect();
        if claimed.is_empty() {
            return 0;
        }

        let claimed = Arc::new(claimed);
        let cursor = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..self.workers.min(claimed.len()))
            .map(|_| {
                let claimed = Arc::clone(&claimed);
                let cursor = Arc::clone(&cursor);
                let lookup = Arc::clone(&lookup);
                let slots = Arc::clone(&self.slots);
                tokio::spawn(async move {
                    while let Some(url) = claimed.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                        let thumbnail = lookup.lookup(url).await;
                        slots.insert(url.clone(), Slot::Done(thumbnail));
                    }
                })
            })
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!("thumbnail worker failed: {err}");
            }
        }

        info!("thumbnails: looked up {} urls", claimed.len());
        claimed.len()
    }

    /// Run [`ThumbnailStore::enrich`] in the background.
    pub fn spawn_enrichment(&self, urls: Vec<String>) -> JoinHandle<usize> {
        let store = self.clone();
        tokio::spawn(async move { store.enrich(urls).await })
    }
}

impl std::fmt::Debug for ThumbnailStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailStore")
            .field("enabled", &self.is_enabled())
            .field("cached", &self.slots.len())
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    impl ThumbnailLookup for Recording {
        fn lookup<'a>(&'a self, url: &'a str) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
            Box::pin(async move {
                tokio::task::yield_now().await;
                self.seen.lock().unwrap().push(url.to_string());
                url.ends_with("/video").then(|| format!("{url}.jpg"))
            })
        }
    }

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn each_url_is_looked_up_once() {
        let lookup = Arc::new(Recording::default());
        let store = ThumbnailStore::new(lookup.clone(), 2);

        let claimed = store
            .enrich(urls(&["https://a.test/video", "https://b.test/page", "https://a.test/video"]))
            .await;
        assert_eq!(claimed, 2);
        assert_eq!(store.enrich(urls(&["https://b.test/page"])).await, 0);

        let mut seen = lookup.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, urls(&["https://a.test/video", "https://b.test/page"]));
        assert_eq!(store.get("https://a.test/video").as_deref(), Some("https://a.test/video.jpg"));
        assert_eq!(store.get("https://b.test/page"), None);
        assert_eq!(store.resolved(), 2);
    }

    #[tokio::test]
    async fn many_urls_with_few_workers() {
        let lookup = Arc::new(Recording::default());
        let store = ThumbnailStore::new(lookup.clone(), 3);
        let many: Vec<String> = (0..20).map(|i| format!("https://c.test/{i}/video")).collect();

        let handle = store.spawn_enrichment(many.clone());
        assert_eq!(handle.await.unwrap(), 20);
        assert_eq!(lookup.seen.lock().unwrap().len(), 20);
        assert!(many.iter().all(|url| store.get(url).is_some()));
    }

    #[tokio::test]
    async fn disabled_store_does_nothing() {
        let store = ThumbnailStore::disabled();
        assert!(!store.is_enabled());
        assert_eq!(store.enrich(urls(&["https://a.test/video"])).await, 0);
        assert_eq!(store.get("https://a.test/video"), None);
    }
}
