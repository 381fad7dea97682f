use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};
use yomidex_reading::{ReadingResolver, ResolveStats};
use yomidex_sheet::records_from_text;
use yomidex_types::Record;

use crate::index::TagIndex;
use crate::source::{Source, SourceError};

/// One fully resolved and indexed load of the sheet. Never mutated after
/// publication.
#[derive(Debug)]
pub struct Snapshot {
    pub generation: u64,
    pub records: Vec<Record>,
    pub index: TagIndex,
    pub readings: ResolveStats,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            records: Vec::new(),
            index: TagIndex::empty(),
            readings: ResolveStats::default(),
        }
    }

    /// Parse, resolve readings, then index. Readings are filled in before
    /// indexing so the index sees stable tags.
    pub async fn build(generation: u64, text: &str, resolver: &ReadingResolver) -> Self {
        let mut records = records_from_text(text);
        let readings = resolver.resolve_records(&mut records).await;
        let index = TagIndex::build(&records);
        Self {
            generation,
            records,
            index,
            readings,
        }
    }

    /// Distinct source URLs in record order.
    pub fn source_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self.records.iter().filter_map(|r| r.source_url.as_deref()) {
            if !urls.iter().any(|seen| seen == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("load {generation} was superseded by generation {current}")]
    Superseded { generation: u64, current: u64 },
}

/// Holds the published snapshot and performs reloads.
///
/// Every reload takes a ticket when it starts. A finished load is only
/// published if no load with a later ticket has been published already,
/// so overlapping reloads can finish in any order.
#[derive(Debug)]
pub struct Catalog {
    source: Source,
    client: reqwest::Client,
    resolver: ReadingResolver,
    current: RwLock<Arc<Snapshot>>,
    tickets: AtomicU64,
    status: RwLock<String>,
}

impl Catalog {
    pub fn new(source: Source, resolver: ReadingResolver) -> Self {
        Self::with_client(source, resolver, reqwest::Client::new())
    }

    pub fn with_client(source: Source, resolver: ReadingResolver, client: reqwest::Client) -> Self {
        Self {
            source,
            client,
            resolver,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            tickets: AtomicU64::new(0),
            status: RwLock::new("not loaded yet".to_string()),
        }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn resolver(&self) -> &ReadingResolver {
        &self.resolver
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Human-readable outcome of the latest load.
    pub fn status(&self) -> String {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_status(&self, message: String) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = message;
    }

    pub fn next_generation(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the published snapshot unless a newer one is already there.
    pub fn publish(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, LoadError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if snapshot.generation <= current.generation {
            return Err(LoadError::Superseded {
                generation: snapshot.generation,
                current: current.generation,
            });
        }
        let snapshot = Arc::new(snapshot);
        *current = Arc::clone(&snapshot);
        drop(current);

        self.set_status(format!(
            "loaded {} records with {} tags",
            snapshot.records.len(),
            snapshot.index.len()
        ));
        Ok(snapshot)
    }

    pub async fn reload(&self) -> Result<Arc<Snapshot>, LoadError> {
        let generation = self.next_generation();
        let start = Instant::now();
        info!("load {generation}: reading {}", self.source);

        let text = match self.source.fetch_text(&self.client).await {
            Ok(text) => text,
            Err(err) => {
                warn!("load {generation} failed: {err}");
                if self.snapshot().generation < generation {
                    self.set_status(err.to_string());
                }
                return Err(err.into());
            }
        };

        let snapshot = Snapshot::build(generation, &text, &self.resolver).await;
        let published = self.publish(snapshot);
        match &published {
            Ok(snapshot) => info!(
                "load {generation}: published {} records in {} ms",
                snapshot.records.len(),
                start.elapsed().as_millis()
            ),
            Err(err) => warn!("{err}"),
        }
        published
    }
}
