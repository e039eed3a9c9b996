use chrono::{DateTime, SecondsFormat, Utc};
use feed_rs::parser::{self, ParseFeedError};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A single entry extracted from a feed document.
///
/// `published` drives the new-entry check; `fields` is the descriptive
/// payload that ends up on the event bus.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub published: Option<DateTime<Utc>>,
    pub fields: Map<String, Value>,
}

impl FeedEntry {
    /// Creates an entry with the given timestamp and no descriptive fields.
    pub fn new(published: Option<DateTime<Utc>>) -> Self {
        Self {
            published,
            fields: Map::new(),
        }
    }

    /// Builder-style helper to attach a descriptive field.
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Event payload for this entry: its fields plus the `feed_url` it came from.
    ///
    /// An existing `feed_url` field is overwritten.
    pub fn to_payload(&self, feed_url: &str) -> Map<String, Value> {
        let mut payload = self.fields.clone();
        payload.insert("feed_url".to_string(), Value::String(feed_url.to_string()));
        payload
    }
}

/// Parses RSS, Atom or JSON Feed bytes into entries, preserving document order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>, ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated);
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry.title.map(|t| t.content);

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let id = generate_id(existing_id, link.as_deref(), title.as_deref(), published);

            let mut fields = Map::new();
            fields.insert("id".to_string(), Value::String(id));
            if let Some(title) = title {
                fields.insert("title".to_string(), Value::String(title));
            }
            if let Some(link) = link {
                fields.insert("link".to_string(), Value::String(link));
            }
            if let Some(summary) = summary {
                fields.insert("summary".to_string(), Value::String(summary));
            }
            if let Some(author) = entry.authors.first() {
                fields.insert("author".to_string(), Value::String(author.name.clone()));
            }
            if let Some(dt) = entry.published {
                fields.insert("published".to_string(), Value::String(rfc3339(dt)));
            }
            if let Some(dt) = entry.updated {
                fields.insert("updated".to_string(), Value::String(rfc3339(dt)));
            }
            if !entry.categories.is_empty() {
                let tags = entry
                    .categories
                    .into_iter()
                    .map(|c| Value::String(c.term))
                    .collect();
                fields.insert("tags".to_string(), Value::Array(tags));
            }

            FeedEntry { published, fields }
        })
        .collect();

    Ok(entries)
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn generate_id(
    existing: Option<&str>,
    link: Option<&str>,
    title: Option<&str>,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(id) = existing {
        let trimmed = id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title.unwrap_or(""),
        published.map(|p| p.timestamp().to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
