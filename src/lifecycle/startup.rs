//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the acceptor
//! - Register the gRPC services and pick the router for the configured mode
//! - Run router and accept loop until a shutdown signal, then drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The router exists before the first connection is accepted

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinError;

use crate::config::MuxConfig;
use crate::grpc::{self, ConnHandler, RouterError};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::acceptor::{Acceptor, AcceptorError};

/// Error type for startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Acceptor(#[from] AcceptorError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error("gRPC server task failed: {0}")]
    Task(#[from] JoinError),
    #[error("gRPC server did not stop within {grace_secs}s and was aborted")]
    ShutdownTimeout { grace_secs: u64 },
}

/// A bound, ready-to-run multiplexer.
pub struct Service {
    config: MuxConfig,
    acceptor: Acceptor,
    handler: Arc<dyn ConnHandler<TcpStream>>,
}

impl Service {
    /// Bind the listener and build the router.
    ///
    /// The gRPC health service is registered so clients can check readiness.
    pub async fn bind(config: MuxConfig) -> Result<Self, StartupError> {
        let acceptor = Acceptor::bind(&config.listener).await?;
        let (_reporter, health) = tonic_health::server::health_reporter();

        let handler = grpc::build_handler(&config.grpc, acceptor.local_addr(), |routes| {
            routes.add_service(health);
        });

        Ok(Self {
            config,
            acceptor,
            handler,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    /// Serve until `signal` resolves, then shut down gracefully.
    ///
    /// Returns [`StartupError::ShutdownTimeout`] if the router is still
    /// running after `shutdown.grace_secs`.
    pub async fn run_until<F>(self, signal: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()>,
    {
        let Service {
            config,
            acceptor,
            handler,
        } = self;

        let shutdown = Shutdown::new();
        let mut server = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler.run().await })
        };
        let accept_loop = tokio::spawn(acceptor.run(Arc::clone(&handler), shutdown.subscribe()));

        signal.await;
        shutdown.trigger();
        handler.shutdown();
        tracing::info!(
            subscribers = shutdown.receiver_count(),
            grace_secs = config.shutdown.grace_secs,
            "Shutdown triggered, draining"
        );

        let grace_secs = config.shutdown.grace_secs;
        let result = match tokio::time::timeout(Duration::from_secs(grace_secs), &mut server).await {
            Ok(joined) => joined?.map_err(StartupError::from),
            Err(_) => {
                tracing::error!(grace_secs, "gRPC server did not stop within the grace period, aborting");
                server.abort();
                Err(StartupError::ShutdownTimeout { grace_secs })
            }
        };

        accept_loop.await?;
        result
    }
}
