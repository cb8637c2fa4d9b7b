//! Relay server.
//!
//! Clients call `/relay/{tenant}/{target}/...`; connectors inside private
//! networks keep a WebSocket open at `/connector/{tenant}` and answer the
//! relayed requests. Any number of instances can run side by side when they
//! share a broker.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────────┐
//!                     │                   RELAY INSTANCE                   │
//!                     │                                                    │
//!   Client call       │  ┌────────┐   ┌──────────────┐   ┌─────────────┐   │
//!   ──────────────────┼─▶│ http   │──▶│ dispatch     │──▶│ transport   │───┼──▶ other instances
//!                     │  │ relay  │   │ request      │   │ tenant      │   │
//!                     │  └───┬────┘   └──────────────┘   └──────┬──────┘   │
//!                     │      │ wait                             │          │
//!                     │      ▼                                  ▼          │
//!                     │  ┌──────────────┐               ┌─────────────┐    │
//!   Client response   │  │ coordination │◀──────────────│ connector   │◀───┼──▶ Connector
//!   ◀─────────────────┼──│ response/ack │  dispatchers  │ registry+hub│    │    (WebSocket)
//!                     │  └──────────────┘               └─────────────┘    │
//!                     │                                                    │
//!                     │  body_store  statistics  lifecycle  observability  │
//!                     └────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use relay_server::config::schema::TransportKind;
use relay_server::config::{load_config, RelayConfig};
use relay_server::lifecycle::signals::shutdown_on_signal;
use relay_server::observability::{logging, metrics};
use relay_server::transport::broker::MemoryBroker;
use relay_server::{RelayServer, Shutdown, TransportBackend};

#[derive(Parser)]
#[command(name = "relay-server")]
#[command(about = "Relays HTTP calls to connectors in private networks", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay-server starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        transport = ?config.transport.kind,
        body_store = ?config.body_store.kind,
        tenants = config.tenants.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                let handle = metrics::install_recorder()?;
                tokio::spawn(async move {
                    if let Err(e) = metrics::serve_metrics(handle, addr).await {
                        tracing::error!(error = %e, "Metrics server failed");
                    }
                });
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // A single process owns the broker; instances in other processes need a networked one.
    let backend = match config.transport.kind {
        TransportKind::InProcess => TransportBackend::InProcess,
        TransportKind::Broker => TransportBackend::Broker(MemoryBroker::new()),
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = RelayServer::new(config, backend, shutdown).await?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
