use crate::types::{Bias, NewsError, Result, SourceSpec};
use std::path::Path;
use tracing::info;

/// Static list of feed sources with their declared editorial bias.
/// Supplied as configuration; the built-in list is used when no config
/// file is given.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceSpec>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceSpec>) -> Self {
        Self { sources }
    }

    /// Load the registry from a JSON array of source specs.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let sources: Vec<SourceSpec> = serde_json::from_str(&content)?;
        if sources.is_empty() {
            return Err(NewsError::General(format!(
                "source registry {} contains no sources",
                path.display()
            )));
        }
        info!("Loaded {} sources from {}", sources.len(), path.display());
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        let spec = |id: &str, name: &str, url: &str, category: &str, bias: Bias| SourceSpec {
            id: id.to_string(),
            name: name.to_string(),
            rss_url: url.to_string(),
            category: category.to_string(),
            declared_bias: bias,
        };

        Self::new(vec![
            spec(
                "bbc",
                "BBC News",
                "https://feeds.bbci.co.uk/news/rss.xml",
                "World",
                Bias::Center,
            ),
            spec(
                "npr",
                "NPR",
                "https://feeds.npr.org/1001/rss.xml",
                "Politics",
                Bias::Left,
            ),
            spec(
                "guardian",
                "The Guardian",
                "https://www.theguardian.com/world/rss",
                "World",
                Bias::Left,
            ),
            spec(
                "reuters",
                "Reuters",
                "https://www.reutersagency.com/feed/",
                "World",
                Bias::Center,
            ),
            spec(
                "fox",
                "Fox News",
                "https://moxie.foxnews.com/google-publisher/latest.xml",
                "Politics",
                Bias::Right,
            ),
            spec(
                "nypost",
                "New York Post",
                "https://nypost.com/feed/",
                "US",
                Bias::Right,
            ),
        ])
    }
}
