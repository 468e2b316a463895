use async_trait::async_trait;
use newslens::{
    read_snapshot, Bias, BiasClassifier, CancelToken, FeedFetch, IngestionCoordinator,
    MockModelClient, NewsError, PacingPolicy, Result, SourceRegistry, SourceSpec,
};
use std::collections::HashMap;

struct StaticFetcher {
    bodies: HashMap<String, String>,
}

#[async_trait]
impl FeedFetch for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| NewsError::General(format!("connection refused: {}", url)))
    }
}

fn source(id: &str, bias: Bias) -> SourceSpec {
    SourceSpec {
        id: id.to_string(),
        name: id.to_uppercase(),
        rss_url: format!("https://{}.example.com/rss", id),
        category: "World".to_string(),
        declared_bias: bias,
    }
}

fn rss_body(title: &str, link: &str, pub_date: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
        <rss version="2.0"><channel><title>feed</title>
        <item>
            <title>{}</title>
            <link>{}</link>
            <pubDate>{}</pubDate>
        </item>
        </channel></rss>"#,
        title, link, pub_date
    )
}

#[tokio::test]
async fn failing_source_contributes_zero_articles() {
    let _ = tracing_subscriber::fmt().try_init();

    let registry = SourceRegistry::new(vec![
        source("a", Bias::Left),
        source("b", Bias::Center),
        source("c", Bias::Right),
    ]);

    let mut bodies = HashMap::new();
    bodies.insert(
        "https://a.example.com/rss".to_string(),
        rss_body(
            "Older story from source A",
            "https://a.example.com/1",
            "Mon, 10 Aug 2026 12:00:00 GMT",
        ),
    );
    // Source B is absent: its fetch fails.
    bodies.insert(
        "https://c.example.com/rss".to_string(),
        rss_body(
            "Newer story from source C",
            "https://c.example.com/1",
            "Wed, 12 Aug 2026 12:00:00 GMT",
        ),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let coordinator =
        IngestionCoordinator::new(registry, StaticFetcher { bodies }, path.clone())
            .with_pacing(PacingPolicy::none());

    let snapshot = coordinator.run().await.expect("run must not fail");

    assert_eq!(snapshot.count, 2);
    let sources: Vec<_> = snapshot.articles.iter().map(|a| a.source_id.as_str()).collect();
    assert!(sources.contains(&"a"));
    assert!(sources.contains(&"c"));
    assert!(!sources.contains(&"b"));

    // Sorted by publication date descending.
    assert_eq!(snapshot.articles[0].source_id, "c");
    assert_eq!(snapshot.articles[1].source_id, "a");

    // The artifact round-trips.
    let loaded = read_snapshot(&path).unwrap();
    assert_eq!(loaded.count, 2);
    assert_eq!(loaded.articles[0].id, snapshot.articles[0].id);
}

#[tokio::test]
async fn classification_attaches_analysis_and_skips_short_titles() {
    let registry = SourceRegistry::new(vec![source("a", Bias::Left)]);

    let body = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel><title>feed</title>
        <item><title>A headline long enough to classify</title>
              <link>https://a.example.com/long</link></item>
        <item><title>Brief</title>
              <link>https://a.example.com/short</link></item>
        </channel></rss>"#
        .to_string();
    let mut bodies = HashMap::new();
    bodies.insert("https://a.example.com/rss".to_string(), body);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let model = MockModelClient::replying(
        r#"{"political_bias":"right","confidence":0.8,"emotional_tone":"negative","factual_ratio":0.6,"explanation":"charged language"}"#,
    );

    let coordinator = IngestionCoordinator::new(registry, StaticFetcher { bodies }, path)
        .with_pacing(PacingPolicy::none())
        .with_classifier(BiasClassifier::new(Box::new(model)));

    let snapshot = coordinator.run().await.unwrap();
    assert_eq!(snapshot.count, 2);

    let long = snapshot
        .articles
        .iter()
        .find(|a| a.url.ends_with("/long"))
        .unwrap();
    let analysis = long.ai_analysis.as_ref().expect("long title is classified");
    assert_eq!(analysis.political_bias, Bias::Right);

    let short = snapshot
        .articles
        .iter()
        .find(|a| a.url.ends_with("/short"))
        .unwrap();
    assert!(short.ai_analysis.is_none(), "short titles skip the model");
}

#[tokio::test]
async fn cancelled_run_stops_issuing_work_but_still_writes() {
    let registry = SourceRegistry::new(vec![source("a", Bias::Left)]);
    let mut bodies = HashMap::new();
    bodies.insert(
        "https://a.example.com/rss".to_string(),
        rss_body("Story", "https://a.example.com/1", "Mon, 10 Aug 2026 12:00:00 GMT"),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let token = CancelToken::new();
    token.cancel();

    let coordinator = IngestionCoordinator::new(registry, StaticFetcher { bodies }, path.clone())
        .with_pacing(PacingPolicy::none())
        .with_cancel_token(token);

    let snapshot = coordinator.run().await.unwrap();
    assert_eq!(snapshot.count, 0);
    assert!(path.exists());
}

#[tokio::test]
async fn post_write_hook_failure_does_not_fail_the_run() {
    let registry = SourceRegistry::new(vec![source("a", Bias::Left)]);
    let mut bodies = HashMap::new();
    bodies.insert(
        "https://a.example.com/rss".to_string(),
        rss_body("Story", "https://a.example.com/1", "Mon, 10 Aug 2026 12:00:00 GMT"),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let coordinator = IngestionCoordinator::new(registry, StaticFetcher { bodies }, path)
        .with_pacing(PacingPolicy::none())
        .with_post_write(|_| Err(NewsError::General("sitemap job unreachable".to_string())));

    let snapshot = coordinator.run().await.expect("hook failure is not fatal");
    assert_eq!(snapshot.count, 1);
}
