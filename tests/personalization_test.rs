use chrono::{Duration, TimeZone, Utc};
use newslens::{
    Article, Bias, FileProfileStore, Interests, ManualClock, MemoryProfileStore,
    PersonalizationStore, ProfileStore, UserProfile,
};
use std::sync::Arc;

fn article(id: &str, title: &str, source: &str, category: &str, bias: Bias) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        summary: format!("summary of {}", title),
        url: format!("https://example.com/{}", id),
        image_url: "https://example.com/img.png".to_string(),
        author: None,
        source_id: source.to_string(),
        source_name: source.to_uppercase(),
        category: category.to_string(),
        topics: Vec::new(),
        publication_date: Utc::now(),
        declared_bias: bias,
        ai_analysis: None,
    }
}

fn store() -> PersonalizationStore {
    PersonalizationStore::in_memory()
}

fn store_with_clock(clock: ManualClock) -> PersonalizationStore {
    PersonalizationStore::new(Box::new(MemoryProfileStore::new()), Arc::new(clock))
}

#[tokio::test]
async fn toggle_follow_is_idempotent() {
    let store = store();

    assert!(store.toggle_follow_source("u1", "bbc").await.unwrap());
    let profile = store.profile("u1").await.unwrap();
    assert_eq!(profile.followed_sources.len(), 1);

    assert!(!store.toggle_follow_source("u1", "bbc").await.unwrap());
    let profile = store.profile("u1").await.unwrap();
    assert!(profile.followed_sources.is_empty(), "second toggle restores the pre-state");
}

#[tokio::test]
async fn toggle_save_is_unique_by_article_id() {
    let store = store();

    assert!(store.toggle_save("u1", "art-1").await.unwrap());
    assert!(store.toggle_save("u1", "art-2").await.unwrap());
    assert!(!store.toggle_save("u1", "art-1").await.unwrap());

    let profile = store.profile("u1").await.unwrap();
    assert_eq!(profile.saved_articles.len(), 1);
    assert_eq!(profile.saved_articles[0].article_id, "art-2");
}

#[tokio::test]
async fn repeat_reads_increment_instead_of_duplicating() {
    let store = store();
    let a = article("a1", "Some headline", "bbc", "World", Bias::Center);

    store.record_read("u1", &a).await.unwrap();
    store.record_read("u1", &a).await.unwrap();

    let profile = store.profile("u1").await.unwrap();
    assert_eq!(profile.reading_history.len(), 1);
    assert_eq!(profile.reading_history[0].read_count, 2);
}

#[tokio::test]
async fn history_is_capped_at_one_thousand() {
    let store = store();

    for i in 0..1001 {
        let a = article(
            &format!("art-{}", i),
            &format!("Headline number {}", i),
            "bbc",
            "World",
            Bias::Center,
        );
        store.record_read("u1", &a).await.unwrap();
    }

    let profile = store.profile("u1").await.unwrap();
    assert_eq!(profile.reading_history.len(), 1000);

    // Newest first; the very first read has been evicted.
    assert_eq!(profile.reading_history[0].article_id, "art-1000");
    assert!(profile
        .reading_history
        .iter()
        .all(|e| e.article_id != "art-0"));
    assert_eq!(profile.reading_history[999].article_id, "art-1");
}

#[tokio::test]
async fn concurrent_mutations_for_one_user_lose_no_updates() {
    let store = Arc::new(store());

    let mut handles = Vec::new();
    for i in 0..50 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let a = article(
                &format!("art-{}", i),
                &format!("Headline number {}", i),
                "bbc",
                "World",
                Bias::Center,
            );
            store.record_read("u1", &a).await.unwrap();
            store.toggle_save("u1", &format!("art-{}", i)).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every read and save landed; none were overwritten by a racing task.
    let profile = store.profile("u1").await.unwrap();
    assert_eq!(profile.reading_history.len(), 50);
    assert_eq!(profile.saved_articles.len(), 50);
}

#[tokio::test]
async fn recommendation_scoring_scenario() {
    let store = store();
    store
        .set_interests(
            "u1",
            Interests {
                topics: vec!["climate".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.toggle_follow_topic("u1", "Technology").await.unwrap();

    // 3 (topic substring) + 2 (followed category) = 5.
    let summit = article("a1", "Climate Summit Reached", "bbc", "Technology", Bias::Left);
    // 2 (followed category) only.
    let chips = article("a2", "New chip ships early", "bbc", "Technology", Bias::Left);
    // Nothing matches: filtered out.
    let sports = article("a3", "Cup final tonight", "bbc", "Sports", Bias::Left);

    let recommended = store
        .recommend("u1", &[chips.clone(), summit.clone(), sports.clone()])
        .await
        .unwrap();

    let ids: Vec<_> = recommended.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"], "sorted by score, non-positive dropped");

    // Reading the article costs 2 points: 5 - 2 = 3, still above chips at 2.
    store.record_read("u1", &summit).await.unwrap();
    let recommended = store
        .recommend("u1", &[chips.clone(), summit.clone()])
        .await
        .unwrap();
    let ids: Vec<_> = recommended.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
}

#[tokio::test]
async fn recommendations_are_capped_at_twenty() {
    let store = store();
    store.toggle_follow_source("u1", "bbc").await.unwrap();

    let candidates: Vec<Article> = (0..30)
        .map(|i| {
            article(
                &format!("c-{}", i),
                &format!("Candidate headline {}", i),
                "bbc",
                "World",
                Bias::Left,
            )
        })
        .collect();

    let recommended = store.recommend("u1", &candidates).await.unwrap();
    assert_eq!(recommended.len(), 20);
    // Ties break by input order.
    assert_eq!(recommended[0].id, "c-0");
}

#[tokio::test]
async fn reading_streak_counts_consecutive_days() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 8, 22, 10, 0, 0).unwrap());
    let store = store_with_clock(clock.clone());

    // Yesterday's read.
    let a = article("a1", "Read yesterday", "bbc", "World", Bias::Center);
    store.record_read("u1", &a).await.unwrap();

    // Today's read; nothing two days ago.
    clock.advance(Duration::days(1));
    let b = article("a2", "Read today", "npr", "Politics", Bias::Left);
    store.record_read("u1", &b).await.unwrap();

    let analytics = store.analytics("u1").await.unwrap();
    assert_eq!(analytics.reading_streak_days, 2);
}

#[tokio::test]
async fn analytics_tallies_history_and_saves() {
    let store = store();

    store
        .record_read("u1", &article("a1", "One", "bbc", "World", Bias::Left))
        .await
        .unwrap();
    store
        .record_read("u1", &article("a2", "Two", "npr", "Politics", Bias::Left))
        .await
        .unwrap();
    store
        .record_read("u1", &article("a3", "Three", "bbc", "World", Bias::Center))
        .await
        .unwrap();
    store.toggle_save("u1", "a1").await.unwrap();

    let analytics = store.analytics("u1").await.unwrap();
    assert_eq!(analytics.total_read, 3);
    assert_eq!(analytics.total_saved, 1);
    assert_eq!(analytics.bias_exposure.left, 2);
    assert_eq!(analytics.bias_exposure.center, 1);
    assert_eq!(analytics.bias_exposure.right, 0);
    assert_eq!(analytics.source_diversity, 2);
    assert_eq!(analytics.category_preferences.get("World"), Some(&2));
    assert!(analytics.avg_reading_time_minutes > 0.0);
}

#[tokio::test]
async fn file_profile_store_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileProfileStore::new(dir.path().to_path_buf());

    assert!(store.get("u1").await.unwrap().is_none());

    let mut profile = UserProfile::default();
    profile.interests.topics.push("climate".to_string());
    store.put("u1", &profile).await.unwrap();

    let loaded = store.get("u1").await.unwrap().unwrap();
    assert_eq!(loaded.interests.topics, vec!["climate".to_string()]);

    // Writes go through a temp file and rename; nothing is left behind.
    assert!(!dir.path().join("u1.json.tmp").exists());

    // Hostile ids cannot escape the directory.
    store.put("../evil", &profile).await.unwrap();
    assert!(dir.path().join("___evil.json").exists());
}
