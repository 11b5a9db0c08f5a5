// src/extract.rs
// Best-effort image and summary extraction for a feed entry. Every fallback
// step is allowed to fail; the extractor always produces something usable
// (placeholder image, None summary) and never aborts the enclosing entry.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;

use crate::feed::FeedEntry;

/// Served when no image can be derived from the entry or the article page.
pub const PLACEHOLDER_IMAGE: &str = "https://placehold.co/600x400?text=News";

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

/// Words kept in a summary before the ellipsis marker.
const SUMMARY_WORD_LIMIT: usize = 100;

static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap());
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Prioritized content containers scanned for paragraph text before falling
/// back to every paragraph on the page.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".article-body",
    ".post-content",
    ".entry-content",
    ".story-body",
    ".content",
];

pub struct ContentExtractor {
    client: reqwest::Client,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor {
    pub fn new() -> Self {
        // A browser-like agent; several outlets refuse default client agents.
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("building article fetch client");
        Self { client }
    }

    /// Resolve an image URL for the entry. Order: structured media field,
    /// inline <img> in the entry HTML, article-page metadata, placeholder.
    pub async fn extract_image(&self, entry: &FeedEntry) -> String {
        if let Some(url) = entry.media_url.as_deref() {
            if !url.trim().is_empty() {
                return url.trim().to_string();
            }
        }

        for html in [entry.content.as_deref(), entry.snippet.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(c) = RE_IMG_SRC.captures(html) {
                return c[1].to_string();
            }
        }

        if let Some(body) = self.fetch_page(&entry.link).await {
            if let Some(url) = image_from_page(&body) {
                return url;
            }
        }

        PLACEHOLDER_IMAGE.to_string()
    }

    /// Resolve a bounded summary for the entry, or None when neither the
    /// feed nor the article page yields any text.
    pub async fn extract_summary(&self, entry: &FeedEntry) -> Option<String> {
        for html in [entry.snippet.as_deref(), entry.content.as_deref()]
            .into_iter()
            .flatten()
        {
            let text = strip_html(html);
            if !text.is_empty() {
                return Some(truncate_words(&text, SUMMARY_WORD_LIMIT));
            }
        }

        let body = self.fetch_page(&entry.link).await?;
        summary_from_page(&body).map(|text| truncate_words(&text, SUMMARY_WORD_LIMIT))
    }

    /// GET the article page. Any failure is logged and absorbed; the caller
    /// moves on to its next fallback.
    async fn fetch_page(&self, url: &str) -> Option<String> {
        if url.trim().is_empty() {
            return None;
        }
        match self.client.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => Some(body),
                Err(e) => {
                    tracing::warn!(error = ?e, %url, "article page body read failed");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = ?e, %url, "article page fetch failed");
                None
            }
        }
    }
}

/// Scan a fetched article page for an image: Open Graph, then Twitter card,
/// then the first <img> that is either undimensioned or larger than 100x100.
fn image_from_page(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);

    let og = Selector::parse(r#"meta[property="og:image"]"#).unwrap();
    if let Some(url) = doc.select(&og).find_map(|m| m.value().attr("content")) {
        return Some(url.to_string());
    }

    let twitter = Selector::parse(r#"meta[name="twitter:image"]"#).unwrap();
    if let Some(url) = doc.select(&twitter).find_map(|m| m.value().attr("content")) {
        return Some(url.to_string());
    }

    let img = Selector::parse("img[src]").unwrap();
    for el in doc.select(&img) {
        let src = match el.value().attr("src") {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let dim = |name: &str| el.value().attr(name).and_then(|v| v.parse::<u32>().ok());
        let big_enough = match (dim("width"), dim("height")) {
            (Some(w), Some(h)) => w > 100 && h > 100,
            // Undeclared dimensions are accepted rather than measured.
            _ => true,
        };
        if big_enough {
            return Some(src.to_string());
        }
    }
    None
}

/// Paragraph text from the first matching content container, else every
/// paragraph longer than 20 characters.
fn summary_from_page(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    let p = Selector::parse("p").unwrap();

    for css in CONTENT_SELECTORS {
        let container = match Selector::parse(css) {
            Ok(sel) => sel,
            Err(_) => continue,
        };
        if let Some(scope) = doc.select(&container).next() {
            let text = scope
                .select(&p)
                .map(|el| el.text().collect::<String>())
                .collect::<Vec<_>>()
                .join(" ");
            let text = collapse_ws(&text);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    let text = doc
        .select(&p)
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .filter(|t| t.chars().count() > 20)
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Decode entities, strip tags, collapse whitespace.
pub fn strip_html(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    collapse_ws(&stripped)
}

fn collapse_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

fn truncate_words(s: &str, limit: usize) -> String {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= limit {
        return words.join(" ");
    }
    format!("{}...", words[..limit].join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with(snippet: Option<&str>, content: Option<&str>, media: Option<&str>) -> FeedEntry {
        FeedEntry {
            title: "t".into(),
            snippet: snippet.map(String::from),
            content: content.map(String::from),
            media_url: media.map(String::from),
            ..FeedEntry::default()
        }
    }

    #[tokio::test]
    async fn media_field_wins_over_inline_img() {
        let x = ContentExtractor::new();
        let e = entry_with(
            None,
            Some(r#"<p>hi</p><img src="https://inline.example/a.png">"#),
            Some("https://media.example/b.jpg"),
        );
        assert_eq!(x.extract_image(&e).await, "https://media.example/b.jpg");
    }

    #[tokio::test]
    async fn inline_img_is_found_case_insensitively() {
        let x = ContentExtractor::new();
        let e = entry_with(None, Some(r#"<IMG SRC='https://inline.example/a.png'/>"#), None);
        assert_eq!(x.extract_image(&e).await, "https://inline.example/a.png");
    }

    #[tokio::test]
    async fn placeholder_when_nothing_resolves() {
        let x = ContentExtractor::new();
        // Empty link means no page fetch is attempted.
        let e = entry_with(Some("no images here"), None, None);
        assert_eq!(x.extract_image(&e).await, PLACEHOLDER_IMAGE);
    }

    #[test]
    fn page_scan_prefers_og_then_twitter_then_large_img() {
        let og = r#"<html><head><meta property="og:image" content="https://o.example/og.png">
            <meta name="twitter:image" content="https://t.example/tw.png"></head></html>"#;
        assert_eq!(image_from_page(og).as_deref(), Some("https://o.example/og.png"));

        let tw = r#"<html><head><meta name="twitter:image" content="https://t.example/tw.png"></head></html>"#;
        assert_eq!(image_from_page(tw).as_deref(), Some("https://t.example/tw.png"));

        let imgs = r#"<html><body>
            <img src="https://i.example/icon.png" width="32" height="32">
            <img src="https://i.example/hero.png" width="640" height="480">
        </body></html>"#;
        assert_eq!(image_from_page(imgs).as_deref(), Some("https://i.example/hero.png"));
    }

    #[tokio::test]
    async fn summary_strips_tags_and_truncates() {
        let x = ContentExtractor::new();
        let long = (0..150).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let e = entry_with(Some(&format!("<p>{long}</p>")), None, None);
        let got = x.extract_summary(&e).await.unwrap();
        assert!(got.ends_with("..."));
        // marker is glued to the hundredth word
        assert_eq!(got.split_whitespace().count(), 100);
        assert!(got.starts_with("w0 w1"));
        assert!(got.contains("w99..."));
    }

    #[tokio::test]
    async fn summary_is_none_without_any_text() {
        let x = ContentExtractor::new();
        let e = entry_with(Some("   "), None, None);
        assert_eq!(x.extract_summary(&e).await, None);
    }

    #[test]
    fn page_summary_prefers_container_paragraphs() {
        let body = r#"<html><body>
            <p>stray paragraph outside containers that is long enough</p>
            <article><p>inside the article body</p><p>second paragraph</p></article>
        </body></html>"#;
        let got = summary_from_page(body).unwrap();
        assert_eq!(got, "inside the article body second paragraph");
    }
}
