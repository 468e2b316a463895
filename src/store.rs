use crate::clock::Clock;
use crate::types::{Article, Bias, NewsError, Result, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Where the store pulls fresh snapshots from. Any conforming producer
/// works: a file written by the ingestion run, an object store, a test stub.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot>;
}

/// Snapshot artifact on the local filesystem.
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

struct CachedSnapshot {
    snapshot: Arc<Snapshot>,
    loaded_at: DateTime<Utc>,
    generation: u64,
}

/// Read-side cache over the latest snapshot. Readers are never blocked by a
/// refresh in flight: they see the previous snapshot until the new one is
/// swapped in whole. Concurrent refreshes coalesce into one fetch.
pub struct ArticleStore {
    source: Box<dyn SnapshotSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: RwLock<Option<CachedSnapshot>>,
    refresh_lock: Mutex<()>,
}

impl ArticleStore {
    pub const DEFAULT_TTL_SECONDS: i64 = 300;

    pub fn new(source: Box<dyn SnapshotSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            ttl: Duration::seconds(Self::DEFAULT_TTL_SECONDS),
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return the cached snapshot while it is younger than the TTL, unless
    /// forced; otherwise refresh. A failed refresh falls back to the stale
    /// cache when one exists.
    pub async fn load(&self, force_refresh: bool) -> Result<Arc<Snapshot>> {
        if !force_refresh {
            if let Some(snapshot) = self.fresh_cached().await {
                return Ok(snapshot);
            }
        }

        let seen_generation = {
            let cache = self.cache.read().await;
            cache.as_ref().map(|c| c.generation)
        };

        let _guard = self.refresh_lock.lock().await;

        // A refresh that completed while we queued for the lock satisfies
        // this call too, forced or not. Only re-fetch when nothing changed.
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let refreshed_while_waiting = Some(cached.generation) != seen_generation;
                let fresh = self.clock.now() - cached.loaded_at < self.ttl;
                if refreshed_while_waiting || (!force_refresh && fresh) {
                    return Ok(Arc::clone(&cached.snapshot));
                }
            }
        }

        debug!("Refreshing article snapshot (force={})", force_refresh);
        match self.source.fetch().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let mut cache = self.cache.write().await;
                let generation = cache.as_ref().map_or(1, |c| c.generation + 1);
                *cache = Some(CachedSnapshot {
                    snapshot: Arc::clone(&snapshot),
                    loaded_at: self.clock.now(),
                    generation,
                });
                info!("Loaded snapshot with {} articles", snapshot.count);
                Ok(snapshot)
            }
            Err(e) => {
                let cache = self.cache.read().await;
                match cache.as_ref() {
                    Some(cached) => {
                        warn!("Snapshot refresh failed, serving stale cache: {}", e);
                        Ok(Arc::clone(&cached.snapshot))
                    }
                    None => Err(NewsError::Unavailable(format!(
                        "no cached snapshot and refresh failed: {}",
                        e
                    ))),
                }
            }
        }
    }

    /// Load (respecting the TTL) and apply a query.
    pub async fn query(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let snapshot = self.load(false).await?;
        Ok(query.apply(&snapshot.articles))
    }

    async fn fresh_cached(&self) -> Option<Arc<Snapshot>> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if self.clock.now() - cached.loaded_at < self.ttl {
            Some(Arc::clone(&cached.snapshot))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    DateDesc,
    TitleAsc,
    SourceAsc,
}

/// Conjunctive filters plus sort and prefix limit, all pure over the
/// cached snapshot.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub bias: Option<Bias>,
    pub source_id: Option<String>,
    pub topic: Option<String>,
    pub section: Option<String>,
    pub text: Option<String>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl ArticleQuery {
    pub fn apply(&self, articles: &[Article]) -> Vec<Article> {
        let needle = self.text.as_ref().map(|t| t.to_lowercase());

        let mut matched: Vec<Article> = articles
            .iter()
            .filter(|a| self.bias.map_or(true, |bias| a.effective_bias() == bias))
            .filter(|a| {
                self.source_id
                    .as_ref()
                    .map_or(true, |id| a.source_id.eq_ignore_ascii_case(id))
            })
            .filter(|a| {
                self.topic.as_ref().map_or(true, |topic| {
                    a.topics.iter().any(|t| t.eq_ignore_ascii_case(topic))
                })
            })
            .filter(|a| {
                self.section
                    .as_ref()
                    .map_or(true, |section| a.category.eq_ignore_ascii_case(section))
            })
            .filter(|a| {
                needle.as_ref().map_or(true, |needle| {
                    a.title.to_lowercase().contains(needle)
                        || a.summary.to_lowercase().contains(needle)
                })
            })
            .cloned()
            .collect();

        match self.sort {
            SortOrder::DateDesc => {
                matched.sort_by(|a, b| b.publication_date.cmp(&a.publication_date))
            }
            SortOrder::TitleAsc => matched.sort_by(|a, b| a.title.cmp(&b.title)),
            SortOrder::SourceAsc => matched.sort_by(|a, b| a.source_name.cmp(&b.source_name)),
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        matched
    }
}
