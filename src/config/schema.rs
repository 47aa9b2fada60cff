//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the multiplexer.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct MuxConfig {
    /// Listener configuration for the demo acceptor.
    pub listener: ListenerConfig,

    /// gRPC subsystem settings.
    pub grpc: GrpcConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4647").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4647".to_string(),
        }
    }
}

/// gRPC subsystem configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GrpcConfig {
    /// Serve gRPC. When false, gRPC connections are logged and closed.
    pub enabled: bool,

    /// Seconds open connections get to finish after shutdown before they
    /// are cut off.
    pub drain_secs: u64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drain_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g., "info", "grpc_mux=debug").
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds to wait for the gRPC server to stop before giving up. Must
    /// exceed `grpc.drain_secs`.
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_secs: 10 }
    }
}
