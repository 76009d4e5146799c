//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::EngineConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load from `path` when given, otherwise fall back to defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(EngineConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [retry]
            delays_ms = [10, 20]

            [bulkhead]
            max_parallelization = 2
            max_queuing = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.delays_ms, vec![10, 20]);
        assert_eq!(config.bulkhead.max_parallelization, 2);
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.fallback.body, "Not found");
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        let err = parse_config("[retry\ndelays_ms = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_semantic_errors_are_collected() {
        let err = parse_config("[cache]\nttl_ms = 0\n[timeout]\ntimeout_ms = 0").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("resilience.toml");
        let config = load_config(&path).unwrap();
        let defaults = EngineConfig::default();
        assert_eq!(config.retry.delays_ms, defaults.retry.delays_ms);
        assert_eq!(config.server.bind_address, defaults.server.bind_address);
        assert_eq!(config.bulkhead.max_queuing, defaults.bulkhead.max_queuing);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
