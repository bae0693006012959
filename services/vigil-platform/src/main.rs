mod config;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use housekeeping::{
    apply_retention, AlertSink, LogAlertSink, OfflineAgentEvaluator, Scheduler, WebhookAlertSink,
};
use job_queue::JobQueue;
use probe_dispatch::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_core::{Clock, Store, SystemClock, BUILD_INFO};

use crate::config::Args;
use crate::routes::{router, PlatformState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenvy::dotenv().is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if env_loaded {
        info!("Loaded .env file");
    }

    let args = Args::parse();
    let policy = args.policy().context("invalid policy configuration")?;
    info!("Starting Vigil Platform {}", BUILD_INFO);

    let store = open_store(&args).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let applied = apply_retention(store.as_ref(), &policy.retention).await;
    info!(tables = applied, "Retention enforcement configured");

    let registry = Arc::new(Registry::with_default_handlers(store.clone()));
    let queue = JobQueue::with_clock(store.clone(), clock.clone());

    let sink: Arc<dyn AlertSink> = match &args.alert_webhook_url {
        Some(url) => {
            info!(%url, "Offline alerts go to webhook");
            Arc::new(WebhookAlertSink::new(url.clone()))
        }
        None => Arc::new(LogAlertSink),
    };
    let evaluator = Arc::new(OfflineAgentEvaluator::new(
        store.clone(),
        sink,
        policy.alerts.offline_threshold(),
    ));

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::spawn(
        store.clone(),
        evaluator,
        clock,
        &policy,
        shutdown.clone(),
    );

    let state = Arc::new(PlatformState { registry, queue });
    let listener = TcpListener::bind(args.listen_addr).await?;
    info!("Vigil Platform listening on {}", listener.local_addr()?);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = server_shutdown.cancelled() => {}
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested");
                    server_shutdown.cancel();
                }
            }
        })
        .await?;

    scheduler.shutdown().await;
    info!("Vigil Platform stopped");
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn open_store(_args: &Args) -> anyhow::Result<Arc<dyn Store>> {
    warn!("No database configured; state is kept in memory");
    Ok(Arc::new(vigil_core::MemoryStore::new()))
}

#[cfg(feature = "postgres")]
async fn open_store(args: &Args) -> anyhow::Result<Arc<dyn Store>> {
    let store = vigil_core::store::PgStore::connect(&args.database_url, args.database_max_connections)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;
    info!("Connected to PostgreSQL");
    Ok(Arc::new(store))
}
