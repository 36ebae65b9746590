use std::sync::Arc;

use air365_backend::config;
use air365_backend::module::air365::{FetchCache, HttpFetcher};
use air365_backend::module::scheduled::{ScheduledTaskManager, SystemClock};
use air365_backend::service::{self, AppState};

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::read_config()?;

    // Initialize logging
    let _logging_guard = air365_backend::logging::init_logging(
        &config.log_dir,
        "air365-backend",
        &config.log_level,
    )?;

    tracing::info!("Air365 backend starting...");

    let bucket_width = config.bucket_width()?;
    let fetcher = Arc::new(HttpFetcher::new(&config.api_url, config.request_timeout())?);
    tracing::info!(
        "Upstream {} (timeout {}s, cache bucket {} min)",
        fetcher.api_url(),
        config.request_timeout().as_secs(),
        bucket_width.as_secs() / 60
    );
    let cache = Arc::new(FetchCache::new(fetcher, bucket_width));

    let groups = config.station_groups();
    if groups.is_empty() {
        tracing::warn!("No valid station groups configured; only the state API will run");
    }

    // Initial refresh happens here, before the API exposes any sensor
    let mut task_manager = ScheduledTaskManager::setup(groups, cache, Arc::new(SystemClock)).await;
    task_manager.start_all();

    let app = service::router(AppState::new(task_manager.registry(), task_manager.status_board()));
    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    tracing::info!("State API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    task_manager.shutdown().await;
    tracing::info!("Air365 backend stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
