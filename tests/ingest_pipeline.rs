// tests/ingest_pipeline.rs
// End-to-end ingestion over fixture feeds and the in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use newswire::category::Category;
use newswire::extract::{ContentExtractor, PLACEHOLDER_IMAGE};
use newswire::ingest::{FeedClient, Ingestor};
use newswire::sources::FeedSource;
use newswire::store::{MemoryStore, NewsItem, NewsStore, StoreError};

const WORLD_XML: &str = include_str!("fixtures/world_feed.xml");
const TECH_XML: &str = include_str!("fixtures/tech_feed.xml");

const WORLD_URL: &str = "https://wire.example.com/world/rss";
const TECH_URL: &str = "https://wire.example.com/tech/rss";

fn fixture_client() -> FeedClient {
    let mut map = HashMap::new();
    map.insert(WORLD_URL.to_string(), WORLD_XML.to_string());
    map.insert(TECH_URL.to_string(), TECH_XML.to_string());
    FeedClient::fixtures(map)
}

fn source(endpoint: &str, category: &str, origin: &str) -> FeedSource {
    FeedSource {
        endpoint: endpoint.to_string(),
        category: Category::normalize(category),
        origin: origin.to_string(),
    }
}

fn ingestor(store: Arc<MemoryStore>) -> Ingestor {
    Ingestor::new(fixture_client(), ContentExtractor::new(), store)
}

#[tokio::test]
async fn one_source_inserts_normalized_items() {
    let store = Arc::new(MemoryStore::new());
    let ing = ingestor(store.clone());

    let src = source(WORLD_URL, "world", "WireService");
    let inserted = ing.process(&src).await.unwrap();
    assert_eq!(inserted.len(), 3);

    let summit = &inserted[0];
    assert_eq!(summit.title, "Summit ends with narrow trade agreement");
    assert_eq!(summit.origin, "WireService");
    assert_eq!(summit.author, "A. Reporter");
    assert_eq!(summit.image_url, "https://img.wire.example.com/summit.jpg");
    // Entry categories plus the source category, normalized and deduped.
    assert!(summit.categories.contains(&Category::World));
    assert!(summit.categories.contains(&Category::Business));
    assert_eq!(summit.categories.len(), 2);
    assert!(summit.summary.as_deref().unwrap().starts_with("Negotiators"));

    // Third item has no enclosure; its inline <img> is picked up instead.
    let flood = inserted
        .iter()
        .find(|i| i.title.starts_with("Flooding"))
        .unwrap();
    assert_eq!(flood.image_url, "https://img.wire.example.com/flood.jpg");
    assert_eq!(flood.author, "Unknown");
    assert_eq!(flood.categories, vec![Category::World]);
}

#[tokio::test]
async fn reprocessing_a_source_inserts_nothing() {
    let store = Arc::new(MemoryStore::new());
    let ing = ingestor(store.clone());
    let src = source(WORLD_URL, "world", "WireService");

    let first = ing.process(&src).await.unwrap();
    assert_eq!(first.len(), 3);
    let second = ing.process(&src).await.unwrap();
    assert!(second.is_empty(), "second pass must be a no-op");
    assert_eq!(store.count(&[]).await.unwrap(), 3);
}

#[tokio::test]
async fn shared_title_across_sources_is_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let ing = ingestor(store.clone());
    // Same origin string on both sources: the shared headline collides.
    let sources = vec![
        source(WORLD_URL, "world", "WireService"),
        source(TECH_URL, "tech", "WireService"),
    ];

    let summary = ing.process_all(&sources).await;
    assert_eq!(summary.sources_processed, 2);
    assert_eq!(summary.errors, 0);
    // 3 world + 3 tech, minus the duplicated headline.
    assert_eq!(summary.new_items, 5);
    assert_eq!(
        store
            .find_existing("Markets steady as talks continue", "WireService")
            .await
            .unwrap()
            .map(|i| i.title)
            .as_deref(),
        Some("Markets steady as talks continue")
    );
    assert_eq!(store.count(&[]).await.unwrap(), 5);

    // Category counts cover every inserted item.
    assert!(summary.per_category.get("World").copied().unwrap_or(0) >= 3);
    assert!(summary.per_category.get("Tech").copied().unwrap_or(0) >= 2);
}

#[tokio::test]
async fn failing_source_is_isolated_from_the_pass() {
    let store = Arc::new(MemoryStore::new());
    let ing = ingestor(store.clone());
    let sources = vec![
        source("https://wire.example.com/missing/rss", "world", "Gone"),
        source(TECH_URL, "tech", "TechWire"),
    ];

    let summary = ing.process_all(&sources).await;
    assert_eq!(summary.sources_processed, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.new_items, 3);
}

#[tokio::test]
async fn entry_without_any_image_gets_the_placeholder() {
    let store = Arc::new(MemoryStore::new());
    let ing = ingestor(store.clone());
    let inserted = ing
        .process(&source(TECH_URL, "tech", "TechWire"))
        .await
        .unwrap();

    let browser = inserted
        .iter()
        .find(|i| i.title.starts_with("Open-source browser"))
        .unwrap();
    assert_eq!(browser.image_url, PLACEHOLDER_IMAGE);
}

/// Store whose operations can be switched to fail, for unavailability tests.
struct OutageStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl OutageStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn guard(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NewsStore for OutageStore {
    async fn find_existing(
        &self,
        title: &str,
        origin: &str,
    ) -> Result<Option<NewsItem>, StoreError> {
        self.guard()?;
        self.inner.find_existing(title, origin).await
    }

    async fn insert(&self, item: &NewsItem) -> Result<bool, StoreError> {
        self.guard()?;
        self.inner.insert(item).await
    }

    async fn find_page(
        &self,
        categories: &[Category],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NewsItem>, StoreError> {
        self.guard()?;
        self.inner.find_page(categories, offset, limit).await
    }

    async fn count(&self, categories: &[Category]) -> Result<u64, StoreError> {
        self.guard()?;
        self.inner.count(categories).await
    }
}

#[tokio::test]
async fn store_outage_skips_entries_without_failing_the_pass() {
    let store = Arc::new(OutageStore::new());
    let ing = Ingestor::new(fixture_client(), ContentExtractor::new(), store.clone());
    let sources = vec![source(WORLD_URL, "world", "WireService")];

    store.failing.store(true, Ordering::SeqCst);
    let inserted = ing
        .process(&sources[0])
        .await
        .expect("store outage must not propagate from a source");
    assert!(inserted.is_empty());

    let summary = ing.process_all(&sources).await;
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.new_items, 0);

    // Nothing was consumed: the next pass picks the entries up.
    store.failing.store(false, Ordering::SeqCst);
    let summary = ing.process_all(&sources).await;
    assert_eq!(summary.new_items, 3);
    assert_eq!(store.count(&[]).await.unwrap(), 3);
}
