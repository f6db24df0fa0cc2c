use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally::api::{self, AppState};
use tally::config::Config;
use tally::counters::{Aggregator, CounterTables, EventRecorder};
use tally::storage;
use tally::visitor::VisitorSigner;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // One handle per (family, granularity), shared by every component
    let tables = Arc::new(CounterTables::new());

    let store = storage::connect(&config.database, Arc::clone(&tables))
        .await
        .context("failed to connect to counter store")?;

    info!("Initializing {} counter tables...", tables.len());
    store
        .init()
        .await
        .context("failed to initialize counter tables")?;
    info!("Counter store initialized successfully");

    let state = Arc::new(AppState {
        recorder: EventRecorder::new(Arc::clone(&store), Arc::clone(&tables)),
        aggregator: Aggregator::new(store, tables),
        signer: VisitorSigner::new(
            config.visitor.secret.as_deref(),
            config.visitor.cookie_name.clone(),
        ),
    });

    let router = api::create_api_router(state, &config.visitor.pixel_path);

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Tally listening on http://{}", addr);
    info!("   - Event ingress at http://{}/api/events/...", addr);
    info!("   - Stats at http://{}/api/stats/...", addr);
    info!("   - Tracking pixel at http://{}{}", addr, config.visitor.pixel_path);

    axum::serve(listener, router).await?;

    Ok(())
}
