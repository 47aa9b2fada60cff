//! TCP accept loop feeding a connection router.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections and hand each one to a `ConnHandler`
//! - Stop when the shutdown signal fires
//! - Graceful handling of accept errors

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;
use crate::grpc::ConnHandler;
use crate::lifecycle::shutdown::ShutdownSignal;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for acceptor operations.
#[derive(Debug, thiserror::Error)]
pub enum AcceptorError {
    /// Bind address did not parse.
    #[error("invalid bind address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: AddrParseError,
    },
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[from] std::io::Error),
}

/// Accepts TCP connections and routes every one to a handler.
pub struct Acceptor {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, AcceptorError> {
        let addr: SocketAddr =
            config
                .bind_address
                .parse()
                .map_err(|source| AcceptorError::Address {
                    address: config.bind_address.clone(),
                    source,
                })?;

        let inner = TcpListener::bind(addr).await?;
        let local_addr = inner.local_addr()?;

        tracing::info!(address = %local_addr, "Listener bound");
        Ok(Self { inner, local_addr })
    }

    /// The bound address, with the real port if `:0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until `shutdown` fires.
    pub async fn run<H>(self, handler: Arc<H>, mut shutdown: ShutdownSignal)
    where
        H: ConnHandler<TcpStream> + ?Sized,
    {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        tracing::debug!(peer_addr = %peer_addr, "Connection accepted");
                        handler.handle(stream);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        tracing::info!(address = %self.local_addr, "Listener stopped accepting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::RouterError;
    use crate::lifecycle::Shutdown;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the peer of every handled connection.
    #[derive(Default)]
    struct Recorder {
        peers: Mutex<Vec<Option<SocketAddr>>>,
    }

    #[async_trait]
    impl ConnHandler<TcpStream> for Recorder {
        fn handle(&self, conn: TcpStream) {
            self.peers.lock().unwrap().push(conn.peer_addr().ok());
        }

        async fn run(&self) -> Result<(), RouterError> {
            Ok(())
        }

        fn shutdown(&self) {}
    }

    fn loopback() -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
        }
    }

    #[tokio::test]
    async fn bind_rejects_bad_address() {
        let config = ListenerConfig {
            bind_address: "not-an-address".into(),
        };
        let err = Acceptor::bind(&config).await.err().unwrap();
        assert!(matches!(err, AcceptorError::Address { .. }));
    }

    #[tokio::test]
    async fn hands_connections_to_handler_until_shutdown() {
        let acceptor = Acceptor::bind(&loopback()).await.unwrap();
        let addr = acceptor.local_addr();
        assert_ne!(addr.port(), 0);

        let recorder = Arc::new(Recorder::default());
        let shutdown = Shutdown::new();
        let task = tokio::spawn(acceptor.run(Arc::clone(&recorder), shutdown.subscribe()));

        let client = TcpStream::connect(addr).await.unwrap();
        let client_addr = client.local_addr().unwrap();

        for _ in 0..50 {
            if !recorder.peers.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*recorder.peers.lock().unwrap(), vec![Some(client_addr)]);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("acceptor did not stop")
            .unwrap();
    }
}
