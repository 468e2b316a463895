use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use newslens::{
    ArticleQuery, ArticleStore, Bias, BiasClassifier, FetchConfig, FileSnapshotSource,
    HttpFeedFetcher, HttpModelClient, IngestionCoordinator, ModelConfig, SortOrder,
    SourceRegistry, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "newslens", about = "News ingestion, bias classification and querying")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one ingestion pass over all sources and write the snapshot.
    Ingest {
        /// JSON file with the source registry; built-in defaults when omitted.
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Where to write the snapshot artifact.
        #[arg(long, default_value = "snapshot.json")]
        snapshot: PathBuf,

        /// Classify articles with the model endpoint (needs NEWSLENS_API_KEY).
        #[arg(long)]
        classify: bool,

        /// Chat-completions endpoint URL.
        #[arg(long)]
        model_url: Option<String>,

        /// Model name.
        #[arg(long)]
        model: Option<String>,
    },
    /// Query the latest snapshot with filters.
    Query {
        #[arg(long, default_value = "snapshot.json")]
        snapshot: PathBuf,

        /// left | center | right
        #[arg(long)]
        bias: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        topic: Option<String>,

        #[arg(long)]
        section: Option<String>,

        /// Substring match on title or summary.
        #[arg(long)]
        text: Option<String>,

        /// date | title | source
        #[arg(long, default_value = "date")]
        sort: String,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ingest {
            sources,
            snapshot,
            classify,
            model_url,
            model,
        } => ingest(sources, snapshot, classify, model_url, model).await,
        Command::Query {
            snapshot,
            bias,
            source,
            topic,
            section,
            text,
            sort,
            limit,
        } => query(snapshot, bias, source, topic, section, text, sort, limit).await,
    }
}

async fn ingest(
    sources: Option<PathBuf>,
    snapshot: PathBuf,
    classify: bool,
    model_url: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let registry = match sources {
        Some(path) => SourceRegistry::from_file(&path)
            .with_context(|| format!("loading source registry from {}", path.display()))?,
        None => SourceRegistry::default(),
    };

    let fetcher = HttpFeedFetcher::new(FetchConfig::default());
    let mut coordinator = IngestionCoordinator::new(registry, fetcher, snapshot);

    if classify {
        let api_key = std::env::var("NEWSLENS_API_KEY")
            .context("--classify requires NEWSLENS_API_KEY to be set")?;
        let mut config = ModelConfig {
            api_key,
            ..Default::default()
        };
        if let Some(url) = model_url {
            config.endpoint = url;
        }
        if let Some(name) = model {
            config.model = name;
        }
        coordinator = coordinator.with_classifier(BiasClassifier::new(Box::new(
            HttpModelClient::new(config),
        )));
    } else {
        warn!("Classification disabled; articles will carry declared bias only");
    }

    // Snapshot write failure is the one fatal outcome; everything
    // source-level has already been absorbed by the coordinator.
    let written = coordinator.run().await.context("ingestion run failed")?;
    info!("Ingestion complete: {} articles", written.count);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn query(
    snapshot: PathBuf,
    bias: Option<String>,
    source: Option<String>,
    topic: Option<String>,
    section: Option<String>,
    text: Option<String>,
    sort: String,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let bias = match bias {
        Some(raw) => match Bias::parse(&raw) {
            Some(b) => Some(b),
            None => bail!("invalid bias '{}', expected left|center|right", raw),
        },
        None => None,
    };

    let sort = match sort.as_str() {
        "date" => SortOrder::DateDesc,
        "title" => SortOrder::TitleAsc,
        "source" => SortOrder::SourceAsc,
        other => bail!("invalid sort '{}', expected date|title|source", other),
    };

    let store = ArticleStore::new(
        Box::new(FileSnapshotSource::new(snapshot)),
        Arc::new(SystemClock),
    );

    let articles = store
        .query(&ArticleQuery {
            bias,
            source_id: source,
            topic,
            section,
            text,
            sort,
            limit,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&articles)?);
    Ok(())
}
