//! Composable resilience policies for async operations.
//!
//! Retry, circuit breaker, timeout, fallback, bulkhead and cache policies
//! wrap any async operation and compose into ordered pipelines, held by name
//! in a registry. An HTTP client operation and a misbehaving demo server
//! show the policies working end to end.

pub mod config;
pub mod demo;
pub mod http;
pub mod observability;
pub mod resilience;

pub use config::schema::EngineConfig;
pub use resilience::{ExecutionContext, Outcome, Pipeline, Policy, PolicyError, PolicyRegistry};
