use crate::classifier::{should_classify, BiasClassifier};
use crate::clock::{Clock, SystemClock};
use crate::fetcher::FeedFetch;
use crate::normalizer::FeedNormalizer;
use crate::snapshot::write_snapshot;
use crate::sources::SourceRegistry;
use crate::types::{Article, Result, Snapshot, SourceSpec};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pacing between outbound calls. Upstream feed hosts and the model
/// endpoint rate-limit aggressive clients, so the run is deliberately
/// sequential and sleeps between calls.
#[derive(Debug, Clone, Copy)]
pub struct PacingPolicy {
    pub between_sources: Duration,
    pub between_classifications: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            between_sources: Duration::from_millis(400),
            between_classifications: Duration::from_millis(100),
        }
    }
}

impl PacingPolicy {
    /// No delays; for tests.
    pub fn none() -> Self {
        Self {
            between_sources: Duration::ZERO,
            between_classifications: Duration::ZERO,
        }
    }
}

/// Run-scoped cancellation: once cancelled, the run stops issuing new
/// per-source work but lets the source in flight finish or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Drives the fetch -> normalize -> classify pipeline across all registered
/// sources and writes one atomic snapshot. Per-source failure contributes
/// zero articles; only a snapshot that cannot be written fails the run.
pub struct IngestionCoordinator<F: FeedFetch> {
    registry: SourceRegistry,
    fetcher: F,
    normalizer: FeedNormalizer,
    classifier: Option<BiasClassifier>,
    pacing: PacingPolicy,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    snapshot_path: PathBuf,
    post_write: Option<Box<dyn Fn(&Snapshot) -> Result<()> + Send + Sync>>,
}

impl<F: FeedFetch> IngestionCoordinator<F> {
    pub fn new(registry: SourceRegistry, fetcher: F, snapshot_path: PathBuf) -> Self {
        Self {
            registry,
            fetcher,
            normalizer: FeedNormalizer::new(),
            classifier: None,
            pacing: PacingPolicy::default(),
            clock: Arc::new(SystemClock),
            cancel: CancelToken::new(),
            snapshot_path,
            post_write: None,
        }
    }

    /// Enable AI classification for this run.
    pub fn with_classifier(mut self, classifier: BiasClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Hook run after a successful snapshot write, used to regenerate
    /// derived artifacts. Its failure is logged, never fatal.
    pub fn with_post_write<H>(mut self, hook: H) -> Self
    where
        H: Fn(&Snapshot) -> Result<()> + Send + Sync + 'static,
    {
        self.post_write = Some(Box::new(hook));
        self
    }

    /// Execute one full ingestion run and write the snapshot artifact.
    pub async fn run(&self) -> Result<Snapshot> {
        let run_id = Uuid::new_v4();
        info!(
            "Starting ingestion run {} over {} sources",
            run_id,
            self.registry.len()
        );

        let mut articles: Vec<Article> = Vec::new();

        for (index, source) in self.registry.sources().iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Run {} cancelled after {} sources", run_id, index);
                break;
            }

            match self.ingest_source(source).await {
                Ok(mut from_source) => {
                    info!(
                        "Source {} contributed {} articles",
                        source.id,
                        from_source.len()
                    );
                    articles.append(&mut from_source);
                }
                Err(e) => {
                    warn!("Source {} failed, contributing zero articles: {}", source.id, e);
                }
            }

            if index + 1 < self.registry.len() && !self.pacing.between_sources.is_zero() {
                tokio::time::sleep(self.pacing.between_sources).await;
            }
        }

        articles.sort_by(|a, b| b.publication_date.cmp(&a.publication_date));

        let snapshot = Snapshot {
            fetched_at: self.clock.now(),
            count: articles.len(),
            articles,
        };

        // The one fatal path: downstream freshness stalls without it.
        write_snapshot(&self.snapshot_path, &snapshot)?;

        if let Some(hook) = &self.post_write {
            if let Err(e) = hook(&snapshot) {
                error!("Post-write hook failed (run continues): {}", e);
            }
        }

        info!(
            "Ingestion run {} wrote {} articles to {}",
            run_id,
            snapshot.count,
            self.snapshot_path.display()
        );
        Ok(snapshot)
    }

    async fn ingest_source(&self, source: &SourceSpec) -> Result<Vec<Article>> {
        let body = self.fetcher.fetch(&source.rss_url).await?;
        let mut articles = self.normalizer.normalize(source, &body, self.clock.now())?;

        if let Some(classifier) = &self.classifier {
            for article in articles.iter_mut() {
                if !should_classify(&article.title) {
                    continue;
                }
                let analysis = classifier
                    .classify(&article.title, &article.summary, &article.source_id)
                    .await;
                article.ai_analysis = Some(analysis);

                if !self.pacing.between_classifications.is_zero() {
                    tokio::time::sleep(self.pacing.between_classifications).await;
                }
            }
        }

        Ok(articles)
    }
}
