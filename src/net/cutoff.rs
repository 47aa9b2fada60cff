//! Force-close switch for connections owned by the gRPC server.
//!
//! # Responsibilities
//! - Wrap every handed-off connection so the router can sever it later
//! - Report EOF on read and a broken pipe on write once severed
//!
//! # Design Decisions
//! - tonic's graceful shutdown waits on every accepted connection, including
//!   peers that never finish the HTTP/2 handshake; severing is what bounds it
//! - One switch per router, shared by all wrapped connections

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;
use tonic::transport::server::Connected;

use crate::net::connection::Connection;

/// Severs every connection wrapped through it, once.
#[derive(Debug, Clone)]
pub struct Cutoff {
    tx: Arc<watch::Sender<bool>>,
}

impl Cutoff {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sever all wrapped connections. Returns `false` if already triggered.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Wrap `conn` so it is severed when this switch is triggered.
    pub fn wrap<C>(&self, conn: C) -> CutoffConn<C> {
        let mut rx = self.tx.subscribe();
        CutoffConn {
            inner: conn,
            cut: async move {
                // Err means the switch itself is gone; sever as well.
                let _ = rx.wait_for(|cut| *cut).await;
            }
            .boxed(),
            severed: false,
        }
    }
}

impl Default for Cutoff {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection that stops carrying bytes once its [`Cutoff`] fires.
pub struct CutoffConn<C> {
    inner: C,
    cut: BoxFuture<'static, ()>,
    severed: bool,
}

impl<C> CutoffConn<C> {
    /// Polls the switch, registering the waker so a pending read or write
    /// is woken when it fires.
    fn poll_severed(&mut self, cx: &mut Context<'_>) -> bool {
        if !self.severed && self.cut.poll_unpin(cx).is_ready() {
            self.severed = true;
        }
        self.severed
    }
}

fn severed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection cut off during shutdown")
}

impl<C: AsyncRead + Unpin> AsyncRead for CutoffConn<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.poll_severed(cx) {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<C: AsyncWrite + Unpin> AsyncWrite for CutoffConn<C> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.poll_severed(cx) {
            return Poll::Ready(Err(severed_error()));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.poll_severed(cx) {
            return Poll::Ready(Err(severed_error()));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<C: Connection> Connection for CutoffConn<C> {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }
}

impl<C: Connected> Connected for CutoffConn<C> {
    type ConnectInfo = C::ConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.inner.connect_info()
    }
}
