// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod cache;
pub mod category;
pub mod extract;
pub mod feed;
pub mod ingest;
pub mod jobs;
pub mod news;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::category::Category;
pub use crate::news::{NewsPage, NewsService, ReadError};
pub use crate::store::{NewsItem, NewsStore};
