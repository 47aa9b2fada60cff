//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → acceptor.rs (accept loop, stands in for the dispatcher)
//!     → ConnHandler::handle
//!     → cutoff.rs (wrapped so shutdown can sever it)
//!     → listener.rs (channel queue, closed flag)
//!     → tonic serve loop pulls via the incoming stream
//! ```
//!
//! # Design Decisions
//! - The channel listener never touches sockets; any `Connection` works
//! - Closing the listener is the only way to stop the serve loop
//! - TLS and protocol sniffing happen before connections reach this layer

pub mod acceptor;
pub mod connection;
pub mod cutoff;
pub mod listener;

pub use connection::{Connection, ConnectionId};
pub use cutoff::{Cutoff, CutoffConn};
pub use listener::{channel, ChannelListener, ConnSender, ListenerError};
