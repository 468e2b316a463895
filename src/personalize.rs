use crate::clock::{Clock, SystemClock};
use crate::types::{
    Article, Bias, BiasExposure, BiasPreference, Interests, NewsError, ReadEvent,
    ReadingAnalytics, Result, SavedRef, SourceRef, TopicRef, UserProfile,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Reading history cap; oldest entries are evicted first.
const HISTORY_CAP: usize = 1000;

/// At most this many recommendations are returned per call.
const MAX_RECOMMENDATIONS: usize = 20;

/// Streaks are only counted this far back.
const STREAK_WINDOW_DAYS: i64 = 30;

/// Estimated minutes spent per read event, used for the reading-time figure.
const MINUTES_PER_READ: f64 = 3.0;

/// Durable per-user profile storage. Any key-value backend satisfies this;
/// a memory map for tests, one JSON document per user on disk in the CLI.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>>;
    async fn put(&self, user_id: &str, profile: &UserProfile) -> Result<()>;
}

/// In-memory profile store.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, profile: &UserProfile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(user_id.to_string(), profile.clone());
        Ok(())
    }
}

/// One JSON document per user under a directory.
pub struct FileProfileStore {
    dir: PathBuf,
}

impl FileProfileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let path = self.path_for(user_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(NewsError::Storage(format!("read {}: {}", path.display(), e))),
        };
        let profile = serde_json::from_str(&content)
            .map_err(|e| NewsError::Storage(format!("decode {}: {}", path.display(), e)))?;
        Ok(Some(profile))
    }

    async fn put(&self, user_id: &str, profile: &UserProfile) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| NewsError::Storage(format!("create {}: {}", self.dir.display(), e)))?;
        let path = self.path_for(user_id);
        let json = serde_json::to_string_pretty(profile)?;

        // Write to a sibling temp file and rename, so a crash mid-write
        // never leaves a truncated profile behind.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| NewsError::Storage(format!("write {}: {}", tmp_path.display(), e)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| NewsError::Storage(format!("rename {}: {}", path.display(), e)))?;
        Ok(())
    }
}

/// Per-user follows, saves, reading history, recommendation scoring and
/// analytics. Mutations for one user are serialized through a per-user
/// lock; different users proceed independently.
pub struct PersonalizationStore {
    store: Box<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PersonalizationStore {
    pub fn new(store: Box<dyn ProfileStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryProfileStore::new()), Arc::new(SystemClock))
    }

    /// The user's profile, a fresh default for first-time users.
    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        Ok(self.store.get(user_id).await?.unwrap_or_default())
    }

    /// Follow or unfollow a source. Returns true when the source is
    /// followed after the call.
    pub async fn toggle_follow_source(&self, user_id: &str, source_id: &str) -> Result<bool> {
        let source_id = source_id.to_string();
        self.with_profile_mut(user_id, move |profile, now| {
            if let Some(pos) = profile.followed_sources.iter().position(|s| s.id == source_id) {
                profile.followed_sources.remove(pos);
                false
            } else {
                profile.followed_sources.push(SourceRef {
                    id: source_id,
                    followed_at: now,
                });
                true
            }
        })
        .await
    }

    /// Follow or unfollow a topic. Returns true when followed after the call.
    pub async fn toggle_follow_topic(&self, user_id: &str, topic: &str) -> Result<bool> {
        let topic = topic.to_string();
        self.with_profile_mut(user_id, move |profile, now| {
            if let Some(pos) = profile
                .followed_topics
                .iter()
                .position(|t| t.name.eq_ignore_ascii_case(&topic))
            {
                profile.followed_topics.remove(pos);
                false
            } else {
                profile.followed_topics.push(TopicRef {
                    name: topic,
                    followed_at: now,
                });
                true
            }
        })
        .await
    }

    /// Save or unsave an article. Returns true when saved after the call.
    pub async fn toggle_save(&self, user_id: &str, article_id: &str) -> Result<bool> {
        let article_id = article_id.to_string();
        self.with_profile_mut(user_id, move |profile, now| {
            if let Some(pos) = profile
                .saved_articles
                .iter()
                .position(|s| s.article_id == article_id)
            {
                profile.saved_articles.remove(pos);
                false
            } else {
                profile.saved_articles.push(SavedRef {
                    article_id,
                    saved_at: now,
                });
                true
            }
        })
        .await
    }

    pub async fn set_interests(&self, user_id: &str, interests: Interests) -> Result<()> {
        self.with_profile_mut(user_id, move |profile, _| {
            profile.interests = interests;
        })
        .await
    }

    /// Record one read. A repeat read bumps the counter and timestamp
    /// instead of duplicating; history is capped, oldest dropped first.
    pub async fn record_read(&self, user_id: &str, article: &Article) -> Result<()> {
        let event = ReadEvent {
            article_id: article.id.clone(),
            title: article.title.clone(),
            source_id: article.source_id.clone(),
            category: article.category.clone(),
            bias: article.effective_bias(),
            read_at: self.clock.now(),
            last_read_at: self.clock.now(),
            read_count: 1,
        };

        self.with_profile_mut(user_id, move |profile, now| {
            if let Some(existing) = profile
                .reading_history
                .iter_mut()
                .find(|e| e.article_id == event.article_id)
            {
                existing.read_count += 1;
                existing.last_read_at = now;
            } else {
                profile.reading_history.insert(0, event);
                profile.reading_history.truncate(HISTORY_CAP);
            }
        })
        .await
    }

    /// Score candidates against the profile and return the best matches,
    /// at most 20, ties kept in input order.
    pub async fn recommend(&self, user_id: &str, candidates: &[Article]) -> Result<Vec<Article>> {
        let profile = self.profile(user_id).await?;

        let mut scored: Vec<(Article, i32)> = candidates
            .iter()
            .map(|article| (article.clone(), score_article(&profile, article)))
            .filter(|(_, score)| *score > 0)
            .collect();

        // Stable sort: ties break by input order.
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(MAX_RECOMMENDATIONS);

        debug!(
            "Recommending {} of {} candidates for user {}",
            scored.len(),
            candidates.len(),
            user_id
        );
        Ok(scored.into_iter().map(|(article, _)| article).collect())
    }

    /// Reading analytics derived purely from the stored profile.
    pub async fn analytics(&self, user_id: &str) -> Result<ReadingAnalytics> {
        let profile = self.profile(user_id).await?;
        let history = &profile.reading_history;

        let total_read: u64 = history.iter().map(|e| e.read_count as u64).sum();

        let mut bias_exposure = BiasExposure::default();
        let mut category_preferences: HashMap<String, u64> = HashMap::new();
        let mut sources: HashSet<&str> = HashSet::new();
        let mut read_days: HashSet<chrono::NaiveDate> = HashSet::new();

        for event in history {
            match event.bias {
                Bias::Left => bias_exposure.left += 1,
                Bias::Center => bias_exposure.center += 1,
                Bias::Right => bias_exposure.right += 1,
            }
            *category_preferences.entry(event.category.clone()).or_insert(0) += 1;
            sources.insert(event.source_id.as_str());
            read_days.insert(event.read_at.date_naive());
            read_days.insert(event.last_read_at.date_naive());
        }

        let active_days = read_days.len() as f64;
        let avg_reading_time_minutes = if active_days > 0.0 {
            total_read as f64 * MINUTES_PER_READ / active_days
        } else {
            0.0
        };

        Ok(ReadingAnalytics {
            total_read,
            total_saved: profile.saved_articles.len(),
            bias_exposure,
            category_preferences,
            source_diversity: sources.len(),
            avg_reading_time_minutes,
            reading_streak_days: reading_streak(&read_days, self.clock.now()),
        })
    }

    async fn with_profile_mut<F, T>(&self, user_id: &str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut UserProfile, DateTime<Utc>) -> T,
    {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut profile = self.store.get(user_id).await?.unwrap_or_default();
        let out = mutate(&mut profile, self.clock.now());
        self.store.put(user_id, &profile).await?;
        Ok(out)
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        // Sweep locks no mutation currently holds, so the table does not
        // grow with every user id ever seen.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    #[cfg(test)]
    async fn lock_table_len(&self) -> usize {
        self.user_locks.lock().await.len()
    }
}

/// Recommendation score for one candidate:
/// +3 interest topic appears in title or summary, +2 category matches a
/// followed topic, +2 source followed, +1 bias preference match (balanced
/// matches center), -2 already read.
pub fn score_article(profile: &UserProfile, article: &Article) -> i32 {
    let mut score = 0;

    let haystack = format!(
        "{} {}",
        article.title.to_lowercase(),
        article.summary.to_lowercase()
    );
    if profile
        .interests
        .topics
        .iter()
        .any(|topic| !topic.is_empty() && haystack.contains(&topic.to_lowercase()))
    {
        score += 3;
    }

    if profile
        .followed_topics
        .iter()
        .any(|t| t.name.eq_ignore_ascii_case(&article.category))
    {
        score += 2;
    }

    if profile
        .followed_sources
        .iter()
        .any(|s| s.id == article.source_id)
    {
        score += 2;
    }

    let bias = article.effective_bias();
    let bias_match = match profile.interests.bias_preference {
        BiasPreference::Balanced => bias == Bias::Center,
        BiasPreference::Left => bias == Bias::Left,
        BiasPreference::Center => bias == Bias::Center,
        BiasPreference::Right => bias == Bias::Right,
    };
    if bias_match {
        score += 1;
    }

    if profile
        .reading_history
        .iter()
        .any(|e| e.article_id == article.id)
    {
        score -= 2;
    }

    score
}

/// Consecutive calendar days with at least one read, counted backward from
/// `now` over at most 30 days. A read-free today is skipped rather than
/// breaking the streak.
fn reading_streak(read_days: &HashSet<chrono::NaiveDate>, now: DateTime<Utc>) -> u32 {
    let today = now.date_naive();
    let mut streak = 0;

    for offset in 0..STREAK_WINDOW_DAYS {
        let day = today - Duration::days(offset);
        if read_days.contains(&day) {
            streak += 1;
        } else if offset == 0 {
            continue;
        } else {
            break;
        }
    }

    streak
}
