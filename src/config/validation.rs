//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds ≥ 1, durations > 0, HTTP statuses)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::EngineConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.bulkhead_work_ms == 0 {
        errors.push(ValidationError::new("server.bulkhead_work_ms", "must be > 0"));
    }

    match url::Url::parse(&config.client.base_url) {
        Ok(url) if url.cannot_be_a_base() => errors.push(ValidationError::new(
            "client.base_url",
            "must be an absolute http(s) URL",
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("client.base_url", e.to_string())),
    }

    if config.retry.delays_ms.iter().any(|d| *d == 0) {
        errors.push(ValidationError::new("retry.delays_ms", "delays must be > 0"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be >= 1",
        ));
    }
    if config.circuit_breaker.break_duration_ms == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.break_duration_ms",
            "must be > 0",
        ));
    }
    if !is_http_status(config.circuit_breaker.failure_status) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_status",
            "must be in 100..=599",
        ));
    }

    if config.timeout.timeout_ms == 0 {
        errors.push(ValidationError::new("timeout.timeout_ms", "must be > 0"));
    }

    if !is_http_status(config.fallback.status) {
        errors.push(ValidationError::new("fallback.status", "must be in 100..=599"));
    }

    if config.bulkhead.max_parallelization == 0 {
        errors.push(ValidationError::new(
            "bulkhead.max_parallelization",
            "must be >= 1",
        ));
    }

    if config.cache.ttl_ms == 0 {
        errors.push(ValidationError::new("cache.ttl_ms", "must be > 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_status(code: u16) -> bool {
    (100..=599).contains(&code)
}
