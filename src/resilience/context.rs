//! Per-invocation execution context.
//!
//! A context is created by the caller for one logical call and cloned as it
//! travels inward through the pipeline. Clones share the value bag, so a
//! value written by an inner layer is visible to the outer ones.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Bag key holding the zero-based attempt number written by the retry policy.
pub const RETRY_ATTEMPT_KEY: &str = "retry.attempt";

/// Correlation data threaded through one pipeline invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    correlation_id: Uuid,
    operation_key: Option<String>,
    cache_key: Option<String>,
    values: Arc<DashMap<String, Value>>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            operation_key: None,
            cache_key: None,
            values: Arc::new(DashMap::new()),
            cancellation: CancellationToken::new(),
        }
    }

    /// Context for a named call site, e.g. `"GET /demo/cache"`.
    pub fn for_operation(key: impl Into<String>) -> Self {
        Self::new().with_operation_key(key)
    }

    pub fn with_operation_key(mut self, key: impl Into<String>) -> Self {
        self.operation_key = Some(key.into());
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Replace the cancellation token, e.g. to tie the call to a shutdown signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn operation_key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of retries performed so far, if a retry policy has run.
    pub fn retry_attempt(&self) -> Option<u64> {
        self.get(RETRY_ATTEMPT_KEY).and_then(|v| v.as_u64())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once this context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Clone sharing the bag, with a child token that can be cancelled
    /// without affecting this context.
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
