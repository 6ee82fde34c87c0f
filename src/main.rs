//! mev-sentry
//!
//! Entry point of the sentry: loads the configuration, builds the validator and
//! builder peers, and serves the `mev` JSON-RPC namespace until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use mev_sentry::config::Config;
use mev_sentry::endpoints;
use mev_sentry::gateway::{router, AdmissionLimiter, Gateway};
use mev_sentry::metrics::{PrometheusRecorder, Recorder};
use mev_sentry::observability::init_logging;
use mev_sentry::peer::{BuilderPeer, ValidatorPeer};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MEV_SENTRY_CONFIG", default_value = "config.toml")]
    config: String,

    /// Overrides `service.listen_addr`
    #[arg(long)]
    listen_addr: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, loaded) = load_config(&args.config)?;
    init_logging(&config.log, args.verbose)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting mev-sentry");
    if loaded {
        info!(path = %args.config, "Configuration loaded");
    } else {
        warn!(path = %args.config, "Config file not found, using defaults");
    }

    if let Some(listen_addr) = args.listen_addr {
        config.service.listen_addr = listen_addr;
    }

    let prometheus = Arc::new(PrometheusRecorder::new().context("failed to register metrics")?);
    let recorder: Arc<dyn Recorder> = prometheus.clone();

    let validators = build_validators(&config, &recorder)?;
    let builders = build_builders(&config, &recorder);
    if validators.is_empty() {
        warn!("No validator configured, every validator-bound call will be rejected");
    }
    if builders.is_empty() {
        warn!("No builder configured, every issue report will be rejected");
    }

    let gateway = Arc::new(Gateway::new(
        validators,
        builders,
        config.service.rpc_timeout(),
        Arc::clone(&recorder),
    ));
    info!(
        validators = gateway.validator_count(),
        builders = gateway.builder_count(),
        rpc_concurrency = config.service.rpc_concurrency,
        rpc_timeout_ms = config.service.rpc_timeout_ms,
        "Routing tables ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_task = if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        let stop = wait_for_shutdown(shutdown_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(&addr, prometheus, stop).await {
                error!(error = %e, "Metrics server error");
            }
        }))
    } else {
        None
    };

    let limiter = AdmissionLimiter::new(config.service.rpc_concurrency, Arc::clone(&recorder));
    let listener = TcpListener::bind(&config.service.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.service.listen_addr))?;
    info!(addr = %config.service.listen_addr, "JSON-RPC server listening");

    axum::serve(listener, router(Arc::clone(&gateway), limiter))
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("JSON-RPC server failed")?;

    if let Some(task) = metrics_task {
        let _ = task.await;
    }

    info!("Shutting down gracefully...");
    drop(gateway);
    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<(Config, bool)> {
    if std::path::Path::new(path).exists() {
        let config = Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))?;
        Ok((config, true))
    } else {
        dotenvy::dotenv().ok();
        Ok((Config::default(), false))
    }
}

/// Validators that fail to build are dropped, except when their keystore cannot be
/// unlocked
fn build_validators(config: &Config, recorder: &Arc<dyn Recorder>) -> Result<Vec<ValidatorPeer>> {
    let mut peers = Vec::with_capacity(config.validators.len());

    for validator in &config.validators {
        match ValidatorPeer::build(
            validator,
            &config.upstream,
            &config.refresh,
            Arc::clone(recorder),
        ) {
            Ok(peer) => peers.push(peer),
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| {
                    format!("failed to unlock account of validator {}", validator.hostname)
                });
            }
            Err(e) => {
                error!(hostname = %validator.hostname, error = %e, "Dropping validator");
            }
        }
    }

    Ok(peers)
}

fn build_builders(config: &Config, recorder: &Arc<dyn Recorder>) -> Vec<BuilderPeer> {
    config
        .builders
        .iter()
        .filter_map(|builder| {
            BuilderPeer::build(builder, &config.upstream, Arc::clone(recorder))
                .map_err(|e| {
                    error!(builder = %builder.address, error = %e, "Dropping builder");
                })
                .ok()
        })
        .collect()
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
