// src/ingest/mod.rs
// Feed fetcher/processor: one pass retrieves every registered source,
// normalizes entries into candidate records, and hands them to the
// deduplicating store. A source failing to fetch or parse never aborts the
// rest of the pass.

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::category::Category;
use crate::extract::{strip_html, ContentExtractor};
use crate::feed;
use crate::sources::FeedSource;
use crate::store::{NewsItem, NewsStore};

const FEED_TIMEOUT: Duration = Duration::from_secs(10);
const TITLE_CHAR_CAP: usize = 500;

/// One-time metrics registration (recording only, no exporter wired here).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Completed ingest passes.");
        describe_counter!("ingest_new_items_total", "Items newly inserted by ingest.");
        describe_counter!(
            "ingest_duplicates_total",
            "Entries skipped because (title, origin) already exists."
        );
        describe_counter!("ingest_source_errors_total", "Source fetch/parse errors.");
        describe_gauge!(
            "ingest_pass_last_run_ts",
            "Unix ts when the last ingest pass finished."
        );
    });
}

/// Normalize an entry title: decode entities, strip tags, fold fancy quotes,
/// collapse whitespace, cap length. The result doubles as the dedup key.
pub fn normalize_title(s: &str) -> String {
    let mut out = strip_html(s);
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    if out.chars().count() > TITLE_CHAR_CAP {
        out = out.chars().take(TITLE_CHAR_CAP).collect();
    }
    out
}

static RE_WS_TRIM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn clean_author(author: Option<String>) -> String {
    let cleaned = author
        .map(|a| RE_WS_TRIM.replace_all(a.trim(), " ").to_string())
        .unwrap_or_default();
    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned
    }
}

/// Feed retrieval: HTTP in production, a canned endpoint->XML map in tests.
pub enum FeedClient {
    Http(reqwest::Client),
    Fixture(HashMap<String, String>),
}

impl FeedClient {
    pub fn http() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FEED_TIMEOUT)
            .user_agent("Mozilla/5.0 (compatible; newswire/0.1)")
            .build()
            .expect("building feed client");
        FeedClient::Http(client)
    }

    pub fn fixtures(map: HashMap<String, String>) -> Self {
        FeedClient::Fixture(map)
    }

    async fn fetch(&self, endpoint: &str) -> Result<String> {
        match self {
            FeedClient::Http(client) => {
                let resp = client
                    .get(endpoint)
                    .send()
                    .await
                    .with_context(|| format!("fetching feed {endpoint}"))?;
                resp.text()
                    .await
                    .with_context(|| format!("reading feed body {endpoint}"))
            }
            FeedClient::Fixture(map) => map
                .get(endpoint)
                .cloned()
                .with_context(|| format!("no fixture for {endpoint}")),
        }
    }
}

/// Aggregate result of one pass over all sources.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PassSummary {
    pub sources_processed: usize,
    pub new_items: usize,
    pub errors: usize,
    pub per_category: HashMap<String, u64>,
}

pub struct Ingestor {
    client: FeedClient,
    extractor: ContentExtractor,
    store: Arc<dyn NewsStore>,
}

impl Ingestor {
    pub fn new(client: FeedClient, extractor: ContentExtractor, store: Arc<dyn NewsStore>) -> Self {
        Self {
            client,
            extractor,
            store,
        }
    }

    /// Process one source: fetch, parse, and insert every entry whose
    /// (title, origin) is not yet stored. Returns the newly inserted items.
    pub async fn process(&self, source: &FeedSource) -> Result<Vec<NewsItem>> {
        let xml = self.client.fetch(&source.endpoint).await?;
        let entries = feed::parse_entries(&xml)
            .with_context(|| format!("parsing feed {}", source.endpoint))?;
        let origin = source.origin_label();

        let mut inserted = Vec::new();
        for entry in entries {
            let title = normalize_title(&entry.title);
            if title.is_empty() {
                continue;
            }

            // Dedup check before extraction so known items cost no scraping.
            match self.store.find_existing(&title, &origin).await {
                Ok(Some(_)) => {
                    counter!("ingest_duplicates_total").increment(1);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    // Store down: this entry is retried on a later pass.
                    tracing::warn!(error = ?e, %title, %origin, "dedup lookup failed, skipping entry");
                    continue;
                }
            }

            let image_url = self.extractor.extract_image(&entry).await;
            let summary = self.extractor.extract_summary(&entry).await;

            let mut categories: Vec<Category> = entry
                .categories
                .iter()
                .map(|c| Category::normalize(c))
                .collect();
            categories.push(source.category.clone());
            categories.sort();
            categories.dedup();

            let item = NewsItem {
                title,
                image_url,
                summary,
                published_at: entry.published_at,
                origin: origin.clone(),
                author: clean_author(entry.author),
                categories,
                url: entry.link,
                created_at: Utc::now(),
            };

            match self.store.insert(&item).await {
                Ok(true) => {
                    counter!("ingest_new_items_total").increment(1);
                    inserted.push(item);
                }
                // Lost a race with a concurrent insert; same as already-known.
                Ok(false) => counter!("ingest_duplicates_total").increment(1),
                Err(e) => {
                    tracing::warn!(error = ?e, title = %item.title, "insert failed, skipping entry");
                }
            }
        }
        Ok(inserted)
    }

    /// One full pass: sequential across sources, each source's failure
    /// isolated and counted.
    pub async fn process_all(&self, sources: &[FeedSource]) -> PassSummary {
        ensure_metrics_described();

        let mut summary = PassSummary::default();
        for source in sources {
            summary.sources_processed += 1;
            match self.process(source).await {
                Ok(items) => {
                    summary.new_items += items.len();
                    for item in &items {
                        for cat in &item.categories {
                            *summary
                                .per_category
                                .entry(cat.label().to_string())
                                .or_insert(0) += 1;
                        }
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    counter!("ingest_source_errors_total").increment(1);
                    tracing::warn!(error = ?e, endpoint = %source.endpoint, "source failed this pass");
                }
            }
        }

        let now = Utc::now().timestamp().max(0) as u64;
        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_pass_last_run_ts").set(now as f64);
        tracing::info!(
            target: "ingest",
            sources = summary.sources_processed,
            new_items = summary.new_items,
            errors = summary.errors,
            "ingest pass finished"
        );
        summary
    }
}
