//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AgentConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source.datacenter must not be empty")]
    EmptyDatacenter,

    #[error("manager.delivery_timeout_ms must be greater than zero")]
    ZeroDeliveryTimeout,

    #[error("registry.poll_interval_secs must be greater than zero")]
    ZeroPollInterval,

    #[error("watch.proxies contains an empty proxy id")]
    EmptyProxyId,

    #[error("invalid observability.metrics_address: {0}")]
    InvalidMetricsAddress(String),

    #[error("invalid observability.log_level: {0}")]
    InvalidLogLevel(String),
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validate a parsed configuration.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.source.datacenter.trim().is_empty() {
        errors.push(ValidationError::EmptyDatacenter);
    }
    if config.manager.delivery_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDeliveryTimeout);
    }
    if config.registry.poll_interval_secs == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }
    if config.watch.proxies.iter().any(|p| p.trim().is_empty()) {
        errors.push(ValidationError::EmptyProxyId);
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
