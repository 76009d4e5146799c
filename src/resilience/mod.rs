//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Caller:
//!     → pipeline.rs (policies folded outermost first around an Operation)
//!     → fallback.rs (substitute rejected outcomes)
//!     → timeouts.rs (race the rest against a deadline)
//!     → cache.rs (serve or store by context key)
//!     → bulkhead.rs (bound concurrent executions, queue the overflow)
//!     → retries.rs (re-invoke on handled outcomes with per-attempt delay)
//!     → circuit_breaker.rs (fail fast after consecutive failures)
//!     → Operation
//! ```
//! The order above is one common arrangement; any order is legal and the
//! pipeline applies exactly the order it was built with.
//!
//! # Design Decisions
//! - Every policy is a cheap-clone handle over shared state, so one instance
//!   can sit in several pipelines and the state is shared between them
//! - Outcomes are `Result<T, PolicyError>`; policy rejections are distinct
//!   error variants, never panics
//! - Cancellation flows inward through the context's token
//! - Policies are stored by name in a registry and resolved at build time

pub mod backoff;
pub mod bulkhead;
pub mod cache;
pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod fallback;
pub mod pipeline;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use bulkhead::BulkheadPolicy;
pub use cache::{CachePolicy, CacheStore, MemoryCacheStore};
pub use circuit_breaker::{CircuitBreakerPolicy, CircuitState};
pub use context::ExecutionContext;
pub use error::{CacheStoreError, Outcome, PolicyError};
pub use fallback::FallbackPolicy;
pub use pipeline::{operation, BoundPipeline, Operation, Pipeline, Policy};
pub use registry::{PolicyRegistry, RegistryError};
pub use retries::RetryPolicy;
pub use timeouts::TimeoutPolicy;
