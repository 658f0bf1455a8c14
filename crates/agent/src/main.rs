//! vSphere Agent - inventory and performance telemetry for vSphere datastores
//!
//! Collects datastore inventory, tags and performance counters, publishes
//! one payload per cycle on stdout and serves health and metrics endpoints.

use agent_lib::{
    collector::{CollectionDriverBuilder, CollectionLoopBuilder, CycleHistory},
    health::HealthRegistry,
    inventory::SnapshotSource,
    observability::StructuredLogger,
    output::StdoutSink,
    performance::CounterCatalog,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the payloads
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("Starting vsphere-agent");

    // Load configuration, rejecting invalid settings before anything runs
    let config = config::AgentConfig::load()?;
    info!(
        endpoint = %config.endpoint,
        vcenter_api = config.vsphere.vcenter_api,
        tags = config.vsphere.tag_collection_enabled(),
        perf_metrics = config.vsphere.perf_metrics_enabled(),
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let cycles = CycleHistory::new();
    let logger = StructuredLogger::new(&config.endpoint);
    logger.log_startup(AGENT_VERSION);

    let source = Arc::new(
        SnapshotSource::from_path(&config.snapshot_path)
            .context("Failed to open inventory snapshot")?
            .with_query_limits(config.vsphere.batch_limits()?),
    );
    let catalog = CounterCatalog::from_settings(&config.vsphere)?;

    let driver = CollectionDriverBuilder::new(config.vsphere.clone())
        .inventory(source.clone())
        .tags(source.clone())
        .performance(source)
        .catalog(catalog)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()
        .context("Failed to build collection driver")?;

    let collection_loop = CollectionLoopBuilder::new()
        .driver(Arc::new(driver))
        .sink(Arc::new(StdoutSink))
        .health(health_registry.clone())
        .history(cycles.clone())
        .logger(logger.clone())
        .interval(config.interval())
        .jitter(config.jitter())
        .cycle_timeout(config.cycle_timeout())
        .integration(&config.integration_name, AGENT_VERSION)
        .build()?;

    let shutdown = CancellationToken::new();

    if config.one_shot {
        let summary = collection_loop.run_once(&shutdown).await?;
        info!(entities = summary.entities, "One-shot collection complete");
        logger.log_shutdown("one-shot collection complete");
        return Ok(());
    }

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), cycles));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let loop_handle = tokio::spawn(collection_loop.run(shutdown.clone()));

    // Wait for shutdown signal
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    logger.log_shutdown("API server failed");
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    logger.log_shutdown("API server task panicked");
                }
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = loop_handle.await {
        error!(error = %e, "Collection loop task panicked");
    }

    info!("Shutting down");
    Ok(())
}
