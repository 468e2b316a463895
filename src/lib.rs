pub mod classifier;
pub mod clock;
pub mod fetcher;
pub mod ingest;
pub mod normalizer;
pub mod personalize;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod types;

pub use classifier::{BiasClassifier, HttpModelClient, MockModelClient, ModelClient, ModelConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetcher::{FeedFetch, FetchConfig, HttpFeedFetcher};
pub use ingest::{CancelToken, IngestionCoordinator, PacingPolicy};
pub use normalizer::FeedNormalizer;
pub use personalize::{FileProfileStore, MemoryProfileStore, PersonalizationStore, ProfileStore};
pub use snapshot::{read_snapshot, write_snapshot};
pub use sources::SourceRegistry;
pub use store::{ArticleQuery, ArticleStore, FileSnapshotSource, SnapshotSource, SortOrder};
pub use types::*;
