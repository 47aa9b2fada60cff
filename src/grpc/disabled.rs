//! Stand-in router used when gRPC is turned off.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::grpc::{ConnHandler, RouterError};
use crate::net::connection::{describe, Connection};
use crate::observability::metrics::{self, Outcome};

/// Closes every connection it is handed.
///
/// The dispatcher should never route gRPC traffic here, so each hand-off is
/// logged as a warning.
#[derive(Debug, Default)]
pub struct DisabledRouter {
    discarded: AtomicU64,
}

impl DisabledRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections closed so far.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<C: Connection> ConnHandler<C> for DisabledRouter {
    fn handle(&self, conn: C) {
        tracing::warn!(from = %describe(&conn), "gRPC conn opened but gRPC is disabled, closing");
        drop(conn);
        self.discarded.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection(Outcome::Disabled);
    }

    async fn run(&self) -> Result<(), RouterError> {
        Ok(())
    }

    fn shutdown(&self) {}
}
