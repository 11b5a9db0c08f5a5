// src/feed.rs
// RSS deserialization. quick-xml's serde support maps a channel into plain
// structs; entity scrubbing happens before parsing because feeds routinely
// embed HTML entities that are not valid XML.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content_encoded: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
    enclosure: Option<Enclosure>,
    #[serde(rename = "media:content")]
    media_content: Option<MediaContent>,
    #[serde(rename = "media:thumbnail")]
    media_thumbnail: Option<MediaContent>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@type", default)]
    mime: String,
}

#[derive(Debug, Deserialize)]
struct MediaContent {
    #[serde(rename = "@url")]
    url: String,
}

/// One parsed feed entry, before extraction and normalization.
#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    /// Feed-provided snippet/description, HTML allowed.
    pub snippet: Option<String>,
    /// Full HTML body when the feed carries one (content:encoded).
    pub content: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    /// Structured media URL (enclosure or media:content), when present.
    pub media_url: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Parse an RSS document into entries. Entries without a title are dropped;
/// a missing pubDate falls back to the time of parsing.
pub fn parse_entries(xml: &str) -> Result<Vec<FeedEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let now = Utc::now();
    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = it.title.unwrap_or_default();
        if title.trim().is_empty() {
            continue;
        }
        let media_url = it
            .enclosure
            .filter(|e| e.mime.is_empty() || e.mime.starts_with("image"))
            .map(|e| e.url)
            .or(it.media_content.map(|m| m.url))
            .or(it.media_thumbnail.map(|m| m.url));

        out.push(FeedEntry {
            title,
            link: it.link.unwrap_or_default(),
            published_at: it
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or(now),
            snippet: it.description,
            content: it.content_encoded,
            author: it.author.or(it.creator),
            categories: it.categories,
            media_url,
        });
    }
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
