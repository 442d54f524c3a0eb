use std::sync::Arc;

use anyhow::Context;
use trade_store::{
    api,
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::Db,
    expiry::scanner::ExpiryScanner,
    logger::init_tracing,
    metrics::counters::Counters,
    trade::{repository::TradeRepository, repository_sqlx::SqlxTradeRepository, store::TradeStore},
};

/// Connects the DB, runs the idempotent schema bootstrap and builds the repository.
async fn init_repository(cfg: &AppConfig) -> anyhow::Result<Arc<dyn TradeRepository>> {
    let db = Db::connect(&cfg.database_url, cfg.db_max_connections)
        .await
        .with_context(|| format!("failed to connect to {}", cfg.database_url))?;
    db.migrate().await.context("schema bootstrap failed")?;

    Ok(Arc::new(SqlxTradeRepository::new(db.pool.as_ref().clone())))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting trade store...");

    let cfg = AppConfig::from_env();

    let repo = init_repository(&cfg).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counters = Counters::default();

    let store = Arc::new(TradeStore::new(repo.clone(), clock.clone(), counters.clone()));

    let scanner = Arc::new(ExpiryScanner::new(repo, clock, counters));
    let sweep_task = scanner.spawn(cfg.sweep_interval, cfg.sweep_initial_delay);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "HTTP API listening");

    axum::serve(listener, api::router(store))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = ?e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shutdown signal received");
    sweep_task.abort();

    Ok(())
}
