// src/news.rs
// Read path: fast cache, then the store (refreshing both cache tiers), then
// the fallback cache when the store is unreachable. A reader only ever sees
// caches populated from a fully successful store read.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::{query_key, CachedPage, TieredCache};
use crate::category::Category;
use crate::store::{NewsItem, NewsStore};

const STORE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Store unreachable and no fallback entry to serve.
    #[error("news store unavailable")]
    Unavailable,
}

/// One page of results. `stale` marks payloads served from the fallback
/// cache instead of a fresh store read.
#[derive(Debug, Clone, Serialize)]
pub struct NewsPage {
    pub items: Vec<NewsItem>,
    pub total_results: u64,
    pub stale: bool,
}

pub struct NewsService {
    store: Arc<dyn NewsStore>,
    cache: Arc<TieredCache>,
    store_timeout: Duration,
}

impl NewsService {
    pub fn new(store: Arc<dyn NewsStore>, cache: Arc<TieredCache>) -> Self {
        Self {
            store,
            cache,
            store_timeout: STORE_TIMEOUT,
        }
    }

    /// Shorter store timeout for tests.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Paginated, category-filterable query, newest first. An empty filter
    /// means no category restriction.
    pub async fn query(
        &self,
        filter: &[Category],
        page: u64,
        limit: u64,
    ) -> Result<NewsPage, ReadError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let mut categories = filter.to_vec();
        categories.sort();
        categories.dedup();

        let key = query_key(&categories, page, limit);
        if let Some(hit) = self.cache.get_fast(&key) {
            return Ok(Self::to_page(hit, false));
        }

        // page and limit come straight from the query string; saturate so an
        // absurd page number reads as an empty far page, never an overflow.
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let result = tokio::time::timeout(self.store_timeout, async {
            tokio::try_join!(
                self.store.find_page(&categories, offset, limit),
                self.store.count(&categories)
            )
        })
        .await;

        match result {
            Ok(Ok((items, total_results))) => {
                self.cache.put(
                    &key,
                    CachedPage {
                        items: items.clone(),
                        total_results,
                    },
                );
                Ok(NewsPage {
                    items,
                    total_results,
                    stale: false,
                })
            }
            Ok(Err(e)) => {
                tracing::warn!(error = ?e, "store read failed, trying fallback cache");
                self.serve_fallback(&key)
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.store_timeout.as_millis() as u64, "store read timed out, trying fallback cache");
                self.serve_fallback(&key)
            }
        }
    }

    fn serve_fallback(&self, key: &str) -> Result<NewsPage, ReadError> {
        match self.cache.get_fallback(key) {
            Some(hit) => {
                tracing::warn!("serving stale payload from fallback cache");
                Ok(Self::to_page(hit, true))
            }
            None => Err(ReadError::Unavailable),
        }
    }

    fn to_page(hit: CachedPage, stale: bool) -> NewsPage {
        NewsPage {
            items: hit.items,
            total_results: hit.total_results,
            stale,
        }
    }
}

/// Parse a comma-separated filter string through the normalizer, so filter
/// requests are forgiving of casing and synonym variance.
pub fn parse_filter(raw: &str) -> Vec<Category> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Category::normalize)
        .collect()
}
