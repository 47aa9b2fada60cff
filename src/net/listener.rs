//! Channel-backed listener for the embedded gRPC server.
//!
//! # Responsibilities
//! - Present a pull-based `accept` over connections pushed by the router
//! - Close exactly once, waking any task blocked in `accept`
//! - Adapt to the incoming stream tonic's serve loop consumes
//!
//! # Design Decisions
//! - Unbounded FIFO queue: the producer never waits on the consumer
//! - Closed flag lives in a watch channel so a late waiter still sees it
//! - Once closed, queued connections are dropped rather than delivered

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};

/// Network name reported in listener errors.
const NETWORK: &str = "tcp";

/// Error type for listener operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// The listener was closed while or before accepting.
    #[error("{op} {net} {addr}: listener closed")]
    Closed {
        op: &'static str,
        net: &'static str,
        addr: SocketAddr,
    },
}

/// Create a connected sender/listener pair reporting `addr` as its address.
pub fn channel<C: Send + 'static>(addr: SocketAddr) -> (ConnSender<C>, ChannelListener<C>) {
    let (conns_tx, conns_rx) = mpsc::unbounded_channel();
    let (done, _) = watch::channel(false);
    let done = Arc::new(done);

    let sender = ConnSender {
        addr,
        conns: conns_tx,
        done: Arc::clone(&done),
    };
    let listener = ChannelListener {
        addr,
        conns: conns_rx,
        done,
    };
    (sender, listener)
}

/// Producer half: pushes connections to the listener and can close it.
pub struct ConnSender<C> {
    addr: SocketAddr,
    conns: mpsc::UnboundedSender<C>,
    done: Arc<watch::Sender<bool>>,
}

impl<C> Clone for ConnSender<C> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr,
            conns: self.conns.clone(),
            done: Arc::clone(&self.done),
        }
    }
}

impl<C> ConnSender<C> {
    /// Queue a connection for the next `accept`.
    ///
    /// Hands the connection back when the listener is closed or its
    /// consumer half is gone; the caller decides how to dispose of it.
    pub fn deliver(&self, conn: C) -> Result<(), C> {
        if self.is_closed() {
            return Err(conn);
        }
        self.conns.send(conn).map_err(|err| err.0)
    }

    /// Close the listener. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        close(&self.done, self.addr)
    }

    pub fn is_closed(&self) -> bool {
        *self.done.borrow()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Future that resolves once the listener is closed.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        wait_closed(self.done.subscribe())
    }
}

/// Consumer half: a listener whose connections arrive over a channel.
pub struct ChannelListener<C> {
    addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<C>,
    done: Arc<watch::Sender<bool>>,
}

impl<C: Send + 'static> ChannelListener<C> {
    /// Wait for the next connection.
    ///
    /// Returns [`ListenerError::Closed`] once the listener is closed, even if
    /// connections are still queued. Those are dropped.
    pub async fn accept(&mut self) -> Result<C, ListenerError> {
        let closed = wait_closed(self.done.subscribe());

        tokio::select! {
            biased;
            _ = closed => {}
            conn = self.conns.recv() => {
                if let Some(conn) = conn {
                    return Ok(conn);
                }
            }
        }

        self.discard_pending();
        Err(ListenerError::Closed {
            op: "accept",
            net: NETWORK,
            addr: self.addr,
        })
    }

    /// Close the listener. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        close(&self.done, self.addr)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connections queued but not yet accepted.
    pub fn pending(&self) -> usize {
        self.conns.len()
    }

    /// Turn the listener into the stream of incoming connections a server
    /// loop consumes. The stream ends when the listener closes.
    pub fn into_incoming(self) -> BoxStream<'static, Result<C, ListenerError>> {
        stream::unfold(self, |mut listener| async move {
            match listener.accept().await {
                Ok(conn) => Some((Ok(conn), listener)),
                Err(err) => {
                    tracing::debug!(error = %err, "Incoming connection stream finished");
                    None
                }
            }
        })
        .boxed()
    }

    fn discard_pending(&mut self) {
        self.conns.close();
        let mut dropped = 0usize;
        while let Ok(conn) = self.conns.try_recv() {
            drop(conn);
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(
                address = %self.addr,
                dropped,
                "Dropped connections queued after close"
            );
        }
    }
}

fn close(done: &watch::Sender<bool>, addr: SocketAddr) -> bool {
    if done.send_replace(true) {
        tracing::debug!(address = %addr, "Listener already closed");
        return false;
    }
    tracing::debug!(address = %addr, "Listener closed");
    true
}

async fn wait_closed(mut done: watch::Receiver<bool>) {
    // Err means the sender is gone, which only happens after every half is dropped.
    let _ = done.wait_for(|closed| *closed).await;
}
