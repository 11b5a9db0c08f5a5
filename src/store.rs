// src/store.rs
// The persistence boundary. `NewsStore` is the single idempotency guard for
// the whole pipeline: lookups and inserts are keyed by (title, origin), and
// the SQLite implementation backs that key with a unique index so a conflict
// reads as "already exists" rather than as an error.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::sync::RwLock;

use crate::category::Category;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One persisted article. Created on first sighting, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub image_url: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub origin: String,
    pub author: String,
    pub categories: Vec<Category>,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Point lookup by the dedup key.
    async fn find_existing(&self, title: &str, origin: &str)
        -> Result<Option<NewsItem>, StoreError>;

    /// Insert unless an equivalent record exists. Returns false when the
    /// (title, origin) pair was already stored.
    async fn insert(&self, item: &NewsItem) -> Result<bool, StoreError>;

    /// A page of items matching any of the given categories (all items when
    /// the filter is empty), newest first.
    async fn find_page(
        &self,
        categories: &[Category],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NewsItem>, StoreError>;

    /// Total count matching the same predicate as `find_page`.
    async fn count(&self, categories: &[Category]) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct NewsRow {
    title: String,
    image_url: String,
    summary: Option<String>,
    published_at: i64,
    origin: String,
    author: String,
    categories: String,
    url: String,
    created_at: i64,
}

impl NewsRow {
    fn into_item(self) -> NewsItem {
        let categories: Vec<Category> =
            serde_json::from_str(&self.categories).unwrap_or_else(|_| vec![Category::General]);
        NewsItem {
            title: self.title,
            image_url: self.image_url,
            summary: self.summary,
            published_at: ts(self.published_at),
            origin: self.origin,
            author: self.author,
            categories,
            url: self.url,
            created_at: ts(self.created_at),
        }
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn categories_json(categories: &[Category]) -> String {
    serde_json::to_string(categories).unwrap_or_else(|_| "[\"General\"]".to_string())
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        // Single connection: with `sqlite::memory:` every pooled connection
        // would otherwise see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    fn push_category_predicate<'a>(
        qb: &mut QueryBuilder<'a, Sqlite>,
        categories: &'a [Category],
    ) {
        if categories.is_empty() {
            return;
        }
        // categories is a JSON array column; match when any element is in
        // the requested set.
        qb.push(" WHERE EXISTS (SELECT 1 FROM json_each(news.categories) je WHERE je.value IN (");
        let mut sep = qb.separated(", ");
        for c in categories {
            sep.push_bind(c.label().to_string());
        }
        sep.push_unseparated("))");
    }
}

#[async_trait]
impl NewsStore for SqliteStore {
    async fn find_existing(
        &self,
        title: &str,
        origin: &str,
    ) -> Result<Option<NewsItem>, StoreError> {
        let row = sqlx::query_as::<_, NewsRow>(
            r#"
            SELECT title, image_url, summary, published_at, origin, author, categories, url, created_at
            FROM news
            WHERE title = ?1 AND origin = ?2
            "#,
        )
        .bind(title)
        .bind(origin)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(NewsRow::into_item))
    }

    async fn insert(&self, item: &NewsItem) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            r#"
            INSERT INTO news (title, image_url, summary, published_at, origin, author, categories, url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(title, origin) DO NOTHING
            "#,
        )
        .bind(&item.title)
        .bind(&item.image_url)
        .bind(&item.summary)
        .bind(item.published_at.timestamp())
        .bind(&item.origin)
        .bind(&item.author)
        .bind(categories_json(&item.categories))
        .bind(&item.url)
        .bind(item.created_at.timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn find_page(
        &self,
        categories: &[Category],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NewsItem>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT title, image_url, summary, published_at, origin, author, categories, url, created_at FROM news",
        );
        Self::push_category_predicate(&mut qb, categories);
        // Bound values arrive as u64; saturate instead of wrapping negative.
        qb.push(" ORDER BY published_at DESC LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<NewsRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(NewsRow::into_item).collect())
    }

    async fn count(&self, categories: &[Category]) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM news");
        Self::push_category_predicate(&mut qb, categories);
        let n: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests, store-less local runs)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<Vec<NewsItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(item: &NewsItem, categories: &[Category]) -> bool {
        categories.is_empty() || item.categories.iter().any(|c| categories.contains(c))
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn find_existing(
        &self,
        title: &str,
        origin: &str,
    ) -> Result<Option<NewsItem>, StoreError> {
        let items = self.items.read().expect("rwlock poisoned");
        Ok(items
            .iter()
            .find(|i| i.title == title && i.origin == origin)
            .cloned())
    }

    async fn insert(&self, item: &NewsItem) -> Result<bool, StoreError> {
        let mut items = self.items.write().expect("rwlock poisoned");
        if items
            .iter()
            .any(|i| i.title == item.title && i.origin == item.origin)
        {
            return Ok(false);
        }
        items.push(item.clone());
        Ok(true)
    }

    async fn find_page(
        &self,
        categories: &[Category],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NewsItem>, StoreError> {
        let items = self.items.read().expect("rwlock poisoned");
        let mut matching: Vec<NewsItem> = items
            .iter()
            .filter(|i| Self::matches(i, categories))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(&self, categories: &[Category]) -> Result<u64, StoreError> {
        let items = self.items.read().expect("rwlock poisoned");
        Ok(items.iter().filter(|i| Self::matches(i, categories)).count() as u64)
    }
}
