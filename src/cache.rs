// src/cache.rs
// Two-tier read cache: a short-TTL fast tier consulted on every query and a
// long-TTL fallback tier that keeps serving stale data while the store is
// down. Plain last-writer-wins maps; writes are idempotent overwrites keyed
// by a deterministic query signature, so no coordination beyond the RwLock
// is needed.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::category::Category;
use crate::store::NewsItem;

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub fast_ttl: Duration,
    pub fallback_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fast_ttl: Duration::from_secs(5 * 60),
            fallback_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Cached payload for one query signature.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub items: Vec<NewsItem>,
    pub total_results: u64,
}

struct Entry {
    payload: CachedPage,
    expires_at: Instant,
}

impl Entry {
    fn new(payload: CachedPage, ttl: Duration) -> Self {
        Self {
            payload,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Deterministic signature for a normalized query: categories are sorted so
/// equivalent filters share an entry regardless of request order.
pub fn query_key(categories: &[Category], page: u64, limit: u64) -> String {
    let mut labels: Vec<&str> = categories.iter().map(|c| c.label()).collect();
    labels.sort_unstable();
    let raw = format!("news:{}|p{}|l{}", labels.join(","), page, limit);
    let digest = Sha256::digest(raw.as_bytes());
    format!("{digest:x}")
}

pub struct TieredCache {
    cfg: CacheConfig,
    fast: RwLock<HashMap<String, Entry>>,
    fallback: RwLock<HashMap<String, Entry>>,
}

impl TieredCache {
    pub fn new(cfg: CacheConfig) -> Self {
        Self {
            cfg,
            fast: RwLock::new(HashMap::new()),
            fallback: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_fast(&self, key: &str) -> Option<CachedPage> {
        Self::get(&self.fast, key)
    }

    pub fn get_fallback(&self, key: &str) -> Option<CachedPage> {
        Self::get(&self.fallback, key)
    }

    /// Populate both tiers after a successful store read.
    pub fn put(&self, key: &str, payload: CachedPage) {
        let mut fast = self.fast.write().expect("rwlock poisoned");
        fast.insert(key.to_string(), Entry::new(payload.clone(), self.cfg.fast_ttl));
        drop(fast);
        let mut fallback = self.fallback.write().expect("rwlock poisoned");
        fallback.insert(key.to_string(), Entry::new(payload, self.cfg.fallback_ttl));
    }

    fn get(map: &RwLock<HashMap<String, Entry>>, key: &str) -> Option<CachedPage> {
        {
            let entries = map.read().expect("rwlock poisoned");
            match entries.get(key) {
                Some(e) if !e.is_expired() => return Some(e.payload.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it lazily.
        let mut entries = map.write().expect("rwlock poisoned");
        if entries.get(key).is_some_and(|e| e.is_expired()) {
            entries.remove(key);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(total: u64) -> CachedPage {
        CachedPage {
            items: Vec::new(),
            total_results: total,
        }
    }

    #[test]
    fn key_is_order_insensitive_for_categories() {
        let a = query_key(&[Category::World, Category::Tech], 1, 10);
        let b = query_key(&[Category::Tech, Category::World], 1, 10);
        assert_eq!(a, b);
        assert_ne!(a, query_key(&[Category::Tech], 1, 10));
        assert_ne!(a, query_key(&[Category::World, Category::Tech], 2, 10));
    }

    #[test]
    fn fast_tier_expires_before_fallback() {
        let cache = TieredCache::new(CacheConfig {
            fast_ttl: Duration::from_millis(0),
            fallback_ttl: Duration::from_secs(60),
        });
        cache.put("k", page(7));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get_fast("k"), None);
        assert_eq!(cache.get_fallback("k").unwrap().total_results, 7);
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let cache = TieredCache::new(CacheConfig::default());
        cache.put("k", page(1));
        cache.put("k", page(2));
        assert_eq!(cache.get_fast("k").unwrap().total_results, 2);
    }
}
