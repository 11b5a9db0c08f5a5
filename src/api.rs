// src/api.rs
// Thin routing adapter over the read path and the scheduler. No auth, no
// business logic; every handler is one call into the core.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::jobs::{JobAck, JobScheduler, FETCH_NEWS_JOB};
use crate::news::{parse_filter, NewsPage, NewsService, ReadError};

#[derive(Clone)]
pub struct AppState {
    pub news: Arc<NewsService>,
    pub scheduler: Arc<JobScheduler>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/news", get(get_news))
        .route("/news/latest", get(get_latest_news))
        .route("/news/update", post(trigger_news_update))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct NewsQuery {
    /// Comma-separated category labels, synonym/casing tolerant.
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    limit: Option<u64>,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: &'static str,
}

type ApiResult = Result<Json<NewsPage>, (StatusCode, Json<ErrorBody>)>;

async fn get_news(State(state): State<AppState>, Query(q): Query<NewsQuery>) -> ApiResult {
    let filter = q.category.as_deref().map(parse_filter).unwrap_or_default();
    run_query(&state, filter, q.page, q.limit).await
}

async fn get_latest_news(State(state): State<AppState>, Query(q): Query<NewsQuery>) -> ApiResult {
    run_query(&state, Vec::new(), q.page, q.limit).await
}

async fn run_query(
    state: &AppState,
    filter: Vec<crate::category::Category>,
    page: Option<u64>,
    limit: Option<u64>,
) -> ApiResult {
    match state
        .news
        .query(&filter, page.unwrap_or(1), limit.unwrap_or(10))
        .await
    {
        Ok(page) => Ok(Json(page)),
        Err(ReadError::Unavailable) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: "news temporarily unavailable",
            }),
        )),
    }
}

async fn trigger_news_update(State(state): State<AppState>) -> Json<JobAck> {
    Json(state.scheduler.trigger_now(FETCH_NEWS_JOB))
}
