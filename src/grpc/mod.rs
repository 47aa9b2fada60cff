//! gRPC connection routing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher (protocol already sniffed)
//!     → ConnHandler::handle
//!         enabled:  router.rs → ChannelListener → tonic serve loop
//!         disabled: disabled.rs → warn + close
//!
//! Lifecycle:
//!     build_handler → spawn run() → handle()* → shutdown() → run() returns
//! ```
//!
//! # Design Decisions
//! - Both routers implement one trait, chosen once at startup
//! - Services are registered before the router exists; no partial state
//! - Connections refused after shutdown are closed, never abandoned

pub mod disabled;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::service::RoutesBuilder;
use tonic::transport::server::Connected;

use crate::config::GrpcConfig;
use crate::net::connection::Connection;

pub use disabled::DisabledRouter;
pub use router::GrpcRouter;

/// Error type for router operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// `run` was called on a router that already ran.
    #[error("gRPC router is already running")]
    AlreadyRunning,
    /// The embedded server's serve loop failed.
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Capabilities shared by every connection router.
#[async_trait]
pub trait ConnHandler<C: Connection>: Send + Sync {
    /// Take ownership of a connection classified as gRPC.
    fn handle(&self, conn: C);

    /// Serve until shutdown. Call once, on its own task.
    async fn run(&self) -> Result<(), RouterError>;

    /// Stop accepting connections and let in-flight calls finish within the
    /// drain timeout.
    fn shutdown(&self);
}

/// Pick the router for the configured mode.
///
/// `register` attaches services and is only invoked when gRPC is enabled.
pub fn build_handler<C, F>(
    config: &GrpcConfig,
    addr: SocketAddr,
    register: F,
) -> Arc<dyn ConnHandler<C>>
where
    C: Connection + Connected,
    F: FnOnce(&mut RoutesBuilder),
{
    if config.enabled {
        let drain = Duration::from_secs(config.drain_secs);
        Arc::new(GrpcRouter::new(addr, register).with_drain_timeout(drain))
    } else {
        tracing::info!(address = %addr, "gRPC is disabled, connections will be closed");
        Arc::new(DisabledRouter::new())
    }
}
