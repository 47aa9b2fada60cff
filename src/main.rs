//! gRPC multiplexer daemon.
//!
//! Accepts TCP connections and routes every one of them into the embedded
//! gRPC server (or closes them when gRPC is disabled).
//!
//! ```text
//!   TCP client ──▶ Acceptor ──▶ ConnHandler::handle
//!                                   │
//!                    enabled ───────┼─────── disabled
//!                       ▼                        ▼
//!               ChannelListener            warn + close
//!                       ▼
//!                 tonic Server (grpc.health.v1.Health)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use grpc_mux::config::{load_config, MuxConfig};
use grpc_mux::lifecycle::signals::shutdown_signal;
use grpc_mux::lifecycle::Service;
use grpc_mux::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "grpc-mux")]
#[command(about = "Routes dispatched connections into an embedded gRPC server", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MuxConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("grpc-mux v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        grpc_enabled = config.grpc.enabled,
        grace_secs = config.shutdown.grace_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let service = Service::bind(config).await?;
    tracing::info!(address = %service.local_addr(), "Listening for connections");

    service.run_until(shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
