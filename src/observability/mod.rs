//! Observability subsystem.
//!
//! # Responsibilities
//! - Structured logging via `tracing` (logging.rs)
//! - Policy counters and gauges via `metrics`, exported to Prometheus (metrics.rs)

pub mod logging;
pub mod metrics;
