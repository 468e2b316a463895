use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Editorial bias label, either declared by the source registry or derived
/// by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Left,
    Center,
    Right,
}

impl Bias {
    /// Lenient parse used when repairing model output.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "left" => Some(Bias::Left),
            "center" | "centre" => Some(Bias::Center),
            "right" => Some(Bias::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Left => "left",
            Bias::Center => "center",
            Bias::Right => "right",
        }
    }
}

/// Emotional tone of an article as judged by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Positive,
    Negative,
}

impl Tone {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "neutral" => Some(Tone::Neutral),
            "positive" => Some(Tone::Positive),
            "negative" => Some(Tone::Negative),
            _ => None,
        }
    }
}

/// AI-derived judgment of one article. Always total: every field is present
/// and within its domain, repaired from whatever the model returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasAnalysis {
    pub political_bias: Bias,
    pub confidence: f64,
    pub emotional_tone: Tone,
    pub factual_ratio: f64,
    pub explanation: String,
}

impl BiasAnalysis {
    /// Fixed neutral analysis substituted whenever classification is
    /// unavailable or the model output cannot be repaired.
    pub fn fallback() -> Self {
        Self {
            political_bias: Bias::Center,
            confidence: 0.5,
            emotional_tone: Tone::Neutral,
            factual_ratio: 0.7,
            explanation: "AI analysis unavailable - showing source-level bias only".to_string(),
        }
    }
}

/// Canonical news item produced by one ingestion run. Immutable after
/// creation; superseded by the next snapshot rather than mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub image_url: String,
    pub author: Option<String>,
    pub source_id: String,
    pub source_name: String,
    pub category: String,
    pub topics: Vec<String>,
    pub publication_date: DateTime<Utc>,
    pub declared_bias: Bias,
    pub ai_analysis: Option<BiasAnalysis>,
}

impl Article {
    /// The bias label to show and tally: AI-derived when available,
    /// otherwise the source's declared label.
    pub fn effective_bias(&self) -> Bias {
        self.ai_analysis
            .as_ref()
            .map(|a| a.political_bias)
            .unwrap_or(self.declared_bias)
    }
}

/// Atomic output of one ingestion run. The sole contract between the
/// ingestion side and the serving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub count: usize,
    pub articles: Vec<Article>,
}

/// One feed source as configured in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub name: String,
    pub rss_url: String,
    pub category: String,
    pub declared_bias: Bias,
}

/// A followed source, kept by id in the user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub followed_at: DateTime<Utc>,
}

/// A followed topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRef {
    pub name: String,
    pub followed_at: DateTime<Utc>,
}

/// A saved article, unique by article id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedRef {
    pub article_id: String,
    pub saved_at: DateTime<Utc>,
}

/// One reading-history entry. Repeat reads of the same article bump
/// `read_count` and `last_read_at` instead of adding a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadEvent {
    pub article_id: String,
    pub title: String,
    pub source_id: String,
    pub category: String,
    pub bias: Bias,
    pub read_at: DateTime<Utc>,
    pub last_read_at: DateTime<Utc>,
    pub read_count: u32,
}

/// How the user wants their feed biased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiasPreference {
    #[default]
    Balanced,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interests {
    pub topics: Vec<String>,
    pub categories: Vec<String>,
    pub bias_preference: BiasPreference,
    pub source_types: Vec<String>,
}

/// Per-user personalization state. Created lazily on first access and
/// mutated only through the PersonalizationStore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub followed_sources: Vec<SourceRef>,
    pub followed_topics: Vec<TopicRef>,
    pub saved_articles: Vec<SavedRef>,
    pub reading_history: Vec<ReadEvent>,
    pub interests: Interests,
}

/// Reading analytics derived from one user's history and saved sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingAnalytics {
    pub total_read: u64,
    pub total_saved: usize,
    pub bias_exposure: BiasExposure,
    pub category_preferences: std::collections::HashMap<String, u64>,
    pub source_diversity: usize,
    pub avg_reading_time_minutes: f64,
    pub reading_streak_days: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiasExposure {
    pub left: u64,
    pub center: u64,
    pub right: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Articles unavailable: {0}")]
    Unavailable(String),

    #[error("Profile storage error: {0}")]
    Storage(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, NewsError>;
