//! Connections handed over by the dispatcher.
//!
//! # Responsibilities
//! - Define the byte stream contract the routers accept
//! - Generate unique connection IDs for tracing
//! - Format remote addresses consistently in log events

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A bidirectional byte stream that the dispatcher has classified as gRPC.
///
/// Ownership moves into the router on hand-off. Dropping the value closes
/// the underlying stream.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Address of the remote peer, if the transport has one.
    fn remote_addr(&self) -> Option<SocketAddr>;
}

impl Connection for TcpStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

impl Connection for DuplexStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Render the remote side of a connection for the `from` log field.
pub fn describe<C: Connection>(conn: &C) -> String {
    match conn.remote_addr() {
        Some(addr) => addr.to_string(),
        None => "<unknown address>".to_string(),
    }
}

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
