//! Shelf sentinel - shelf stock and theft reconciliation server
//!
//! Module structure:
//! - `domain/` - Core types (shelves, sales, thefts, alerts, readings)
//! - `io/` - External interfaces (HTTP API, Prometheus, serial, MQTT)
//! - `services/` - Shelf engine and its components
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use shelf_sentinel::infra::{Config, Metrics};
use shelf_sentinel::io::{start_api_server, start_mqtt_ingest, ApiState, SerialBridge};
use shelf_sentinel::services::{
    DisabledClassifier, HttpClassifier, MisplacementClassifier, ShelfEngine,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Shelf sentinel - sensor fusion, stock alerts and theft reconciliation
#[derive(Parser, Debug)]
#[command(name = "shelf-sentinel", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "shelf-sentinel starting");

    let args = Args::parse();
    // A config file that exists but does not parse is fatal
    let config = Config::load_from_path(&args.config)
        .with_context(|| format!("Refusing to start with config {}", args.config))?;

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        bind = %config.server_bind_address(),
        port = %config.server_port(),
        shelves = %config.shelves().len(),
        theft_window_min = %config.policy().theft_window_minutes,
        serial = %config.serial_enabled(),
        mqtt = %config.mqtt_enabled(),
        classifier = %config.classifier_enabled(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    // A misconfigured shelf is fatal
    let engine = Arc::new(
        ShelfEngine::from_config(&config, metrics.clone())
            .context("Refusing to start with invalid shelf configuration")?,
    );

    let classifier: Arc<dyn MisplacementClassifier> = if config.classifier_enabled() {
        let http = HttpClassifier::from_config(&config).context("Failed to build classifier client")?;
        info!(url = %http.url(), "classifier_enabled");
        Arc::new(http)
    } else {
        Arc::new(DisabledClassifier)
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if config.serial_enabled() {
        let bridge = SerialBridge::new(&config, engine.clone());
        let serial_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            bridge.run(serial_shutdown).await;
        });
    }

    if config.mqtt_enabled() {
        let mqtt_config = config.clone();
        let mqtt_engine = engine.clone();
        let mqtt_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_mqtt_ingest(&mqtt_config, mqtt_engine, mqtt_shutdown).await {
                error!(error = %e, "MQTT ingest error");
            }
        });
    }

    // Periodic metrics log line
    let report_engine = engine.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = report_engine
                .metrics()
                .report(report_engine.pending_sales(), report_engine.flagged_thefts());
            summary.log();
        }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let fetch_timeout = std::time::Duration::from_millis(config.classifier_timeout_ms());
    let state = Arc::new(ApiState::new(engine, classifier, config.site_id(), fetch_timeout)?);
    start_api_server(config.server_bind_address(), config.server_port(), state, shutdown_rx).await?;

    info!("shelf-sentinel shutdown complete");
    Ok(())
}
