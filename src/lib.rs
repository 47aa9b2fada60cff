//! gRPC connection multiplexer.
//!
//! Routes connections that an external dispatcher has already classified as
//! gRPC into an embedded tonic server through a channel-backed listener.

pub mod config;
pub mod grpc;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::MuxConfig;
pub use grpc::{build_handler, ConnHandler, DisabledRouter, GrpcRouter, RouterError};
pub use lifecycle::{Service, Shutdown};
pub use net::{channel, ChannelListener, ConnSender, Connection, ListenerError};
