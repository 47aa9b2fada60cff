//! Routes dispatched connections into an embedded tonic server.
//!
//! # Responsibilities
//! - Own the registered gRPC routes and the channel listener feeding them
//! - Run tonic's serve loop over the listener until shutdown
//! - Bound the drain: connections still open after it are cut off
//! - Forward plain HTTP requests when fronted by an HTTP multiplexer

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Request, Response};
use tonic::service::{Routes, RoutesBuilder};
use tonic::transport::server::Connected;
use tonic::transport::Server;
use tower::ServiceExt;

use crate::grpc::{ConnHandler, RouterError};
use crate::net::connection::{describe, Connection, ConnectionId};
use crate::net::cutoff::{Cutoff, CutoffConn};
use crate::net::listener::{self, ChannelListener, ConnSender};
use crate::observability::metrics::{self, Outcome};

/// How long in-flight connections get to finish after shutdown by default.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A gRPC server fed by connections handed over through [`GrpcRouter::handle`].
pub struct GrpcRouter<C> {
    routes: Routes,
    conns: ConnSender<CutoffConn<C>>,
    /// Taken by the first `run`.
    listener: Mutex<Option<ChannelListener<CutoffConn<C>>>>,
    cutoff: Cutoff,
    drain_timeout: Duration,
}

impl<C> GrpcRouter<C>
where
    C: Connection + Connected,
{
    /// Create a router reporting `addr` as its listen address.
    ///
    /// `register` runs once, before the router is returned, and attaches the
    /// services the server will expose.
    pub fn new<F>(addr: SocketAddr, register: F) -> Self
    where
        F: FnOnce(&mut RoutesBuilder),
    {
        let mut builder = RoutesBuilder::default();
        register(&mut builder);

        let (conns, listener) = listener::channel(addr);
        tracing::debug!(address = %addr, "gRPC router created");

        Self {
            routes: builder.routes(),
            conns,
            listener: Mutex::new(Some(listener)),
            cutoff: Cutoff::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Set how long `run` waits for open connections after shutdown before
    /// cutting them off.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Hand a connection to the gRPC server.
    ///
    /// After shutdown the connection is closed instead.
    pub fn handle(&self, conn: C) {
        let id = ConnectionId::new();
        let from = describe(&conn);

        match self.conns.deliver(self.cutoff.wrap(conn)) {
            Ok(()) => {
                tracing::debug!(connection_id = %id, from = %from, "Handed connection to gRPC server");
                metrics::record_connection(Outcome::Delivered);
            }
            Err(conn) => {
                drop(conn);
                tracing::debug!(
                    connection_id = %id,
                    from = %from,
                    "gRPC server is shut down, closed connection"
                );
                metrics::record_connection(Outcome::Discarded);
            }
        }
    }

    /// Serve the registered routes until [`GrpcRouter::shutdown`].
    ///
    /// Returns at most the drain timeout after shutdown, even when a peer
    /// keeps its connection open.
    pub async fn run(&self) -> Result<(), RouterError> {
        let listener = self.take_listener().ok_or(RouterError::AlreadyRunning)?;
        let addr = listener.local_addr();
        tracing::info!(address = %addr, "gRPC server starting");

        let serve = Server::builder()
            .add_routes(self.routes.clone())
            .serve_with_incoming_shutdown(listener.into_incoming(), self.conns.closed());
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => result?,
            () = self.conns.closed() => {
                if let Ok(result) = tokio::time::timeout(self.drain_timeout, &mut serve).await {
                    result?;
                } else {
                    tracing::warn!(
                        address = %addr,
                        drain_ms = self.drain_timeout.as_millis() as u64,
                        "gRPC connections still open after drain, cutting them off"
                    );
                    self.cutoff.trigger();
                    serve.await?;
                }
            }
        }

        tracing::info!(address = %addr, "gRPC server stopped");
        Ok(())
    }

    /// Stop accepting connections. In-flight calls get the drain timeout to
    /// finish before `run` cuts their connections off.
    pub fn shutdown(&self) {
        if self.conns.close() {
            tracing::info!(address = %self.conns.local_addr(), "gRPC server shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.conns.is_closed()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.conns.local_addr()
    }

    /// Answer a single HTTP request with the registered routes.
    pub async fn serve_http(&self, request: Request<axum::body::Body>) -> Response<tonic::body::Body> {
        match self.routes.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    /// The registered routes as an axum router, for mounting behind an HTTP
    /// multiplexer.
    pub fn axum_router(&self) -> axum::Router {
        self.routes.clone().into_axum_router()
    }

    fn take_listener(&self) -> Option<ChannelListener<CutoffConn<C>>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl<C> ConnHandler<C> for GrpcRouter<C>
where
    C: Connection + Connected,
{
    fn handle(&self, conn: C) {
        GrpcRouter::handle(self, conn)
    }

    async fn run(&self) -> Result<(), RouterError> {
        GrpcRouter::run(self).await
    }

    fn shutdown(&self) {
        GrpcRouter::shutdown(self)
    }
}
