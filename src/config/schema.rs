//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine,
//! the demo server and the demo client. All types derive Serde traits for
//! deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Demo server settings.
    pub server: ServerConfig,

    /// HTTP client settings for the demo scenarios.
    pub client: ClientConfig,

    pub retry: RetryConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub timeout: TimeoutConfig,

    pub fallback: FallbackConfig,

    pub bulkhead: BulkheadConfig,

    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Demo server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5000").
    pub bind_address: String,

    /// Calls to `/demo/retry` that fail before one succeeds.
    pub retry_failures: u32,

    /// Calls to `/demo/circuit-breaker` answered with 429 before one succeeds.
    pub throttled_calls: u32,

    /// How long `/demo/timeout` stalls before answering.
    pub slow_response_ms: u64,

    /// How long each `/demo/bulkhead` call holds its connection.
    pub bulkhead_work_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5000".to_string(),
            retry_failures: 3,
            throttled_calls: 3,
            slow_response_ms: 5000,
            bulkhead_work_ms: 500,
        }
    }
}

impl ServerConfig {
    pub fn slow_response(&self) -> Duration {
        Duration::from_millis(self.slow_response_ms)
    }

    pub fn bulkhead_work(&self) -> Duration {
        Duration::from_millis(self.bulkhead_work_ms)
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL the demo scenarios call.
    pub base_url: String,

    /// Parallel callers launched by the bulkhead scenario.
    pub bulkhead_callers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            bulkhead_callers: 40,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before each retry, in milliseconds. The length is the retry count.
    pub delays_ms: Vec<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delays_ms: vec![1000, 2000, 3000],
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive handled failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open, in milliseconds.
    pub break_duration_ms: u64,

    /// Response status counted as a failure.
    pub failure_status: u16,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            break_duration_ms: 2000,
            failure_status: 429,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_duration_ms)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

impl TimeoutConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Fallback configuration: the response substituted for failed calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub status: u16,
    pub body: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            status: 404,
            body: "Not found".to_string(),
        }
    }
}

/// Bulkhead configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkheadConfig {
    pub max_parallelization: usize,
    pub max_queuing: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_parallelization: 10,
            max_queuing: 20,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in milliseconds.
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 2000 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
