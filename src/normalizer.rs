use crate::types::{Article, NewsError, Result, SourceSpec};
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use tracing::{debug, info};

/// Fallback artwork for items that carry no image at all. The pick is keyed
/// off the article fingerprint so it stays put between runs.
const PLACEHOLDER_IMAGES: [&str; 4] = [
    "https://placehold.co/800x450/1f2937/f9fafb?text=News",
    "https://placehold.co/800x450/374151/f9fafb?text=Headlines",
    "https://placehold.co/800x450/4b5563/f9fafb?text=Story",
    "https://placehold.co/800x450/6b7280/f9fafb?text=Report",
];

/// Turns one raw feed payload into canonical article records. A malformed
/// individual entry is skipped; only a payload that fails to parse at all
/// is an error, and the coordinator treats that as zero articles.
pub struct FeedNormalizer;

impl FeedNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        source: &SourceSpec,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        let feed = parser::parse(body.as_bytes())
            .map_err(|e| NewsError::Parse(format!("failed to parse feed for {}: {}", source.id, e)))?;

        let feed_image = feed_level_image(&feed);
        let mut articles = Vec::new();

        for entry in feed.entries {
            match self.normalize_entry(source, entry, feed_image.as_deref(), now) {
                Some(article) => articles.push(article),
                None => debug!("Skipping entry without a link from {}", source.id),
            }
        }

        info!("Normalized {} articles from {}", articles.len(), source.id);
        Ok(articles)
    }

    fn normalize_entry(
        &self,
        source: &SourceSpec,
        entry: Entry,
        feed_image: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Article> {
        let url = entry.links.first()?.href.clone();

        let title = sanitize_text(
            &entry
                .title
                .as_ref()
                .map(|t| t.content.clone())
                .unwrap_or_else(|| "Untitled".to_string()),
        );

        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .map(|raw| sanitize_text(&raw))
            .unwrap_or_default();

        let id = fingerprint(&source.id, &url, &title);

        let image_url = entry_image(&entry)
            .or_else(|| feed_image.map(|s| s.to_string()))
            .unwrap_or_else(|| placeholder_image(&id).to_string());

        let author = entry
            .authors
            .first()
            .map(|a| a.name.clone())
            .filter(|name| !name.trim().is_empty());

        // Unparseable or absent dates never fail the record.
        let publication_date = entry.published.or(entry.updated).unwrap_or(now);

        let topics: Vec<String> = entry
            .categories
            .into_iter()
            .map(|c| c.term)
            .filter(|t| !t.trim().is_empty())
            .collect();

        Some(Article {
            id,
            title,
            summary,
            url,
            image_url,
            author,
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            category: source.category.clone(),
            topics,
            publication_date,
            declared_bias: source.declared_bias,
            ai_analysis: None,
        })
    }
}

impl Default for FeedNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic content fingerprint over `source_id|link|title`.
/// FNV-1a 64, rendered as 16 hex digits. No clock, no randomness.
pub fn fingerprint(source_id: &str, link: &str, title: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in source_id
        .bytes()
        .chain([b'|'])
        .chain(link.bytes())
        .chain([b'|'])
        .chain(title.bytes())
    {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{:016x}", hash)
}

/// Strip markup tags, decode the common entities, collapse whitespace, trim.
pub fn sanitize_text(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                if in_tag {
                    in_tag = false;
                    // Tags act as word separators once removed.
                    stripped.push(' ');
                } else {
                    stripped.push('>');
                }
            }
            c if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn placeholder_image(id: &str) -> &'static str {
    let key = id
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    PLACEHOLDER_IMAGES[key % PLACEHOLDER_IMAGES.len()]
}

/// Resolution order: enclosure, media content, media thumbnail.
fn entry_image(entry: &Entry) -> Option<String> {
    if let Some(enclosure) = entry.links.iter().find(|link| {
        link.rel.as_deref() == Some("enclosure")
            && link
                .media_type
                .as_deref()
                .map(|mt| mt.starts_with("image"))
                .unwrap_or(false)
    }) {
        return Some(enclosure.href.clone());
    }

    // RSS enclosures surface as the entry content's src link.
    if let Some(content) = &entry.content {
        let is_image = content
            .content_type
            .type_()
            .as_str()
            .eq_ignore_ascii_case("image");
        if is_image {
            if let Some(src) = &content.src {
                return Some(src.href.clone());
            }
        }
    }

    for media in &entry.media {
        for content in &media.content {
            let is_image = content
                .content_type
                .as_ref()
                .map(|mime| mime.type_().as_str() == "image")
                .unwrap_or(true);
            if is_image {
                if let Some(url) = &content.url {
                    return Some(url.to_string());
                }
            }
        }
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
    }

    None
}

fn feed_level_image(feed: &Feed) -> Option<String> {
    feed.logo
        .as_ref()
        .map(|logo| logo.uri.clone())
        .or_else(|| feed.icon.as_ref().map(|icon| icon.uri.clone()))
}
