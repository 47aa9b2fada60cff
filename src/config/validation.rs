//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, filter directives and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MuxConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use crate::config::schema::MuxConfig;

/// A single semantic problem in a config.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("observability.log_level: '{0}' is not a valid filter")]
    InvalidLogLevel(String),

    #[error("shutdown.grace_secs must be greater than zero")]
    ZeroGracePeriod,

    #[error("grpc.drain_secs ({drain_secs}) must be less than shutdown.grace_secs ({grace_secs})")]
    DrainExceedsGrace { drain_secs: u64, grace_secs: u64 },
}

pub fn validate_config(config: &MuxConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        "listener.bind_address",
        &config.listener.bind_address,
        &mut errors,
    );

    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.shutdown.grace_secs == 0 {
        errors.push(ValidationError::ZeroGracePeriod);
    } else if config.grpc.enabled && config.grpc.drain_secs >= config.shutdown.grace_secs {
        errors.push(ValidationError::DrainExceedsGrace {
            drain_secs: config.grpc.drain_secs,
            grace_secs: config.shutdown.grace_secs,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
