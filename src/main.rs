//! newswire — Binary Entrypoint
//! Boots the Axum HTTP server and the background ingestion pipeline:
//! source registry, deduplicating store, tiered cache, job queue, scheduler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newswire::api::{create_router, AppState};
use newswire::cache::{CacheConfig, TieredCache};
use newswire::extract::ContentExtractor;
use newswire::ingest::{FeedClient, Ingestor};
use newswire::jobs::{JobHandler, JobQueue, JobScheduler, RetryPolicy, FETCH_NEWS_JOB};
use newswire::news::NewsService;
use newswire::sources;
use newswire::store::{NewsStore, SqliteStore};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newswire=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let registry = sources::load_sources_default().context("loading source registry")?;
    tracing::info!(sources = registry.len(), "source registry loaded");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:newswire.db?mode=rwc".to_string());
    let store: Arc<dyn NewsStore> = Arc::new(
        SqliteStore::connect(&database_url)
            .await
            .context("connecting news store")?,
    );

    let cache = Arc::new(TieredCache::new(CacheConfig::default()));
    let news = Arc::new(NewsService::new(store.clone(), cache));

    let ingestor = Arc::new(Ingestor::new(
        FeedClient::http(),
        ContentExtractor::new(),
        store,
    ));
    let registry = Arc::new(registry);

    // Background jobs are a configurable capability: a disabled queue still
    // acknowledges triggers so the read side works without ingestion.
    let queue = if std::env::var("NEWS_JOBS_DISABLED").is_ok_and(|v| v == "1") {
        tracing::warn!("background jobs disabled, using no-op queue");
        JobQueue::noop()
    } else {
        let handler: JobHandler = {
            let ingestor = ingestor.clone();
            let registry = registry.clone();
            Arc::new(move || {
                let ingestor = ingestor.clone();
                let registry = registry.clone();
                Box::pin(async move {
                    let summary = ingestor.process_all(&registry).await;
                    // A pass where every source failed usually means the
                    // network or store is down; let the queue retry it.
                    anyhow::ensure!(
                        summary.sources_processed == 0
                            || summary.errors < summary.sources_processed,
                        "all {} sources failed this pass",
                        summary.sources_processed
                    );
                    Ok(())
                })
            })
        };
        JobQueue::start(RetryPolicy::default(), handler)
    };

    let scheduler = Arc::new(JobScheduler::new(queue));
    let interval = Duration::from_secs(env_u64("NEWS_FETCH_INTERVAL_SECS", 600));
    scheduler.register_recurring(FETCH_NEWS_JOB, interval);

    let router = create_router(AppState {
        news,
        scheduler: scheduler.clone(),
    });

    let port = env_u64("PORT", 8000) as u16;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "serving");
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
