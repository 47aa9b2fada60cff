//! Metrics collection and exposition.
//!
//! # Metrics
//! - `grpc_mux_connections_total` (counter): connections handed to a router,
//!   labelled by `outcome`

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// What happened to a handed-off connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Queued for the gRPC server.
    Delivered,
    /// Closed because the server was shutting down.
    Discarded,
    /// Closed because gRPC is disabled.
    Disabled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Delivered => "delivered",
            Outcome::Discarded => "discarded",
            Outcome::Disabled => "disabled",
        }
    }
}

pub fn record_connection(outcome: Outcome) {
    ::metrics::counter!("grpc_mux_connections_total", "outcome" => outcome.as_str()).increment(1);
}

/// Install the Prometheus exporter with a scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}
