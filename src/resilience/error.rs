//! Failure kinds surfaced by the policy pipeline.
//!
//! Every failure is a value: policies return `Err(PolicyError)` inside an
//! [`Outcome`] and never panic. [`CacheStoreError`] is the one kind that never
//! reaches a caller; the cache policy logs it and degrades to a miss.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result of one invocation of an operation or a policy.
pub type Outcome<T> = Result<T, PolicyError>;

/// Errors produced by an operation or by one of the policies wrapping it.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    /// The wrapped operation failed on its own.
    #[error("operation failed: {0}")]
    Operation(Arc<dyn StdError + Send + Sync + 'static>),

    /// Rejected by an open (or half-open with a trial in flight) circuit.
    #[error("circuit '{policy}' is open, retry after {retry_after:?}")]
    CircuitOpen { policy: String, retry_after: Duration },

    /// Rejected by a manually isolated circuit.
    #[error("circuit '{policy}' is isolated")]
    CircuitIsolated { policy: String },

    /// The operation did not complete before the deadline.
    #[error("timeout policy '{policy}' expired after {after:?}")]
    Timeout { policy: String, after: Duration },

    /// No execution or queue capacity left.
    #[error("bulkhead '{policy}' rejected call ({max_parallelization} executing, {max_queuing} queued)")]
    BulkheadRejected {
        policy: String,
        max_parallelization: usize,
        max_queuing: usize,
    },

    /// The context was cancelled before the operation produced an outcome.
    #[error("execution cancelled")]
    Cancelled,
}

impl PolicyError {
    /// Wrap an operation's own error.
    pub fn operation<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        PolicyError::Operation(Arc::new(err))
    }

    /// Wrap a plain message as an operation failure.
    pub fn message(msg: impl Into<String>) -> Self {
        PolicyError::Operation(Arc::new(OperationMessage(msg.into())))
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, PolicyError::Operation(_))
    }

    /// True for both open and isolated circuit rejections.
    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            PolicyError::CircuitOpen { .. } | PolicyError::CircuitIsolated { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PolicyError::Timeout { .. })
    }

    pub fn is_bulkhead_rejected(&self) -> bool {
        matches!(self, PolicyError::BulkheadRejected { .. })
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::Operation(_) => "operation",
            PolicyError::CircuitOpen { .. } => "circuit_open",
            PolicyError::CircuitIsolated { .. } => "circuit_isolated",
            PolicyError::Timeout { .. } => "timeout",
            PolicyError::BulkheadRejected { .. } => "bulkhead_rejected",
            PolicyError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct OperationMessage(String);

/// Best-effort cache store failure.
#[derive(Debug, Clone, Error)]
#[error("cache store failure for key '{key}': {reason}")]
pub struct CacheStoreError {
    pub key: String,
    pub reason: String,
}

impl CacheStoreError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
