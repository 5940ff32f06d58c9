//! Integration gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!   Application                                   Third-party providers
//!   ───────────┐                                 ┌──────────────────────
//!              ▼                                 │
//!        ┌──────────┐   ┌──────────┐   ┌─────────┴─┐   ┌──────────┐
//!        │ Gateway  │──▶│ registry │──▶│ executor  │──▶│ provider │
//!        └────┬─────┘   └────┬─────┘   │ rl → cb → │   │ adapter  │
//!             │              │         │ retry     │   └──────────┘
//!             │              ▼         └─────┬─────┘
//!             │        health sweep          │
//!             │              │               ▼
//!             │              └──────────▶ event bus ──▶ subscribers
//!             │                              ▲
//!   Provider ─┼─▶ http ingress ─▶ webhook dispatcher
//!   webhooks  │   (axum)          validate → dedup → handler
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use integration_gateway::config::{load_config, GatewayConfig};
use integration_gateway::events::LogSubscriber;
use integration_gateway::lifecycle::{spawn_signal_listener, Shutdown};
use integration_gateway::observability::{logging, metrics};
use integration_gateway::provider::ProviderCatalog;
use integration_gateway::{Gateway, HttpServer};

#[derive(Parser)]
#[command(name = "integration-gateway")]
#[command(about = "Resilient gateway between the application and third-party providers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config: GatewayConfig = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "integration-gateway starting");
    tracing::info!(
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        integrations = config.integrations.len(),
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let gateway = Arc::new(Gateway::new(ProviderCatalog::builtin(), &config));

    let mut tasks = Vec::new();
    if config.events.audit_log {
        tasks.push(
            gateway
                .events()
                .spawn_subscriber(Arc::new(LogSubscriber), shutdown.subscribe()),
        );
    }

    gateway.bootstrap(&config).await?;

    let monitor = gateway.health_monitor();
    let health_rx = shutdown.subscribe();
    tasks.push(tokio::spawn(async move { monitor.run(health_rx).await }));

    spawn_signal_listener(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(gateway.clone(), &config);
    let result = server.run(listener, shutdown.subscribe()).await;

    // The server also stops on fatal errors; make sure the rest follows.
    shutdown.trigger();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    gateway.shutdown().await;

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
