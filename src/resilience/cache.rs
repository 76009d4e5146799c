//! Short-lived result caching.
//!
//! # Responsibilities
//! - Derive a cache key from the execution context
//! - Serve unexpired entries without invoking the next layer
//! - Store cacheable outcomes with a fresh insertion time
//!
//! # Design Decisions
//! - Lazy expiry: an entry past its ttl is removed when read, no sweeper task
//! - Failures are never cached
//! - Store errors are best-effort: logged, reported, then treated as a miss
//! - Concurrent puts for one key are last-write-wins

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::FutureExt;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::resilience::context::ExecutionContext;
use crate::resilience::error::{CacheStoreError, Outcome};
use crate::resilience::pipeline::{BoxOutcome, Operation, OutcomePredicate, Policy};

/// Backing storage for [`CachePolicy`].
pub trait CacheStore<T>: Send + Sync {
    /// Unexpired value for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<T>, CacheStoreError>;

    fn put(&self, key: &str, value: T, ttl: Duration) -> Result<(), CacheStoreError>;
}

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.inserted_at + self.ttl
    }
}

/// Concurrent in-memory store.
pub struct MemoryCacheStore<T> {
    entries: DashMap<String, CacheEntry<T>>,
}

impl<T: Clone + Send + Sync> MemoryCacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<T: Clone + Send + Sync> Default for MemoryCacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> CacheStore<T> for MemoryCacheStore<T> {
    fn get(&self, key: &str) -> Result<Option<T>, CacheStoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Re-check under the shard lock so a fresh concurrent put survives.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    fn put(&self, key: &str, value: T, ttl: Duration) -> Result<(), CacheStoreError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }
}

pub type KeyFn = Arc<dyn Fn(&ExecutionContext) -> Option<String> + Send + Sync>;
pub type CacheObserver = Arc<dyn Fn(&str) + Send + Sync>;
pub type CacheErrorObserver = Arc<dyn Fn(&str, &CacheStoreError) + Send + Sync>;

pub struct CachePolicy<T> {
    inner: Arc<CacheInner<T>>,
}

struct CacheInner<T> {
    name: String,
    ttl: Duration,
    store: Arc<dyn CacheStore<T>>,
    key_fn: KeyFn,
    cacheable: OutcomePredicate<T>,
    on_hit: Option<CacheObserver>,
    on_miss: Option<CacheObserver>,
    on_put: Option<CacheObserver>,
    on_error: Option<CacheErrorObserver>,
}

impl<T> CacheInner<T> {
    fn store_error(&self, key: &str, err: &CacheStoreError) {
        tracing::warn!(
            policy = %self.name,
            key,
            error = %err,
            "Cache store error, continuing without cache"
        );
        metrics::record_cache(&self.name, "error");
        if let Some(observer) = &self.on_error {
            observer(key, err);
        }
    }
}

impl<T> Clone for CachePolicy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for CachePolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> CachePolicy<T> {
    pub fn builder(name: impl Into<String>, ttl: Duration) -> CachePolicyBuilder<T> {
        CachePolicyBuilder {
            name: name.into(),
            ttl,
            store: None,
            key_fn: Arc::new(|ctx: &ExecutionContext| {
                ctx.cache_key()
                    .or_else(|| ctx.operation_key())
                    .map(str::to_string)
            }),
            cacheable: Arc::new(|outcome: &Outcome<T>| outcome.is_ok()),
            on_hit: None,
            on_miss: None,
            on_put: None,
            on_error: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    async fn run(self, ctx: ExecutionContext, next: Operation<T>) -> Outcome<T> {
        let inner = &self.inner;
        let Some(key) = (inner.key_fn)(&ctx) else {
            tracing::debug!(policy = %inner.name, "No cache key, bypassing cache");
            return next(ctx).await;
        };

        match inner.store.get(&key) {
            Ok(Some(value)) => {
                tracing::debug!(policy = %inner.name, key = %key, "Cache hit");
                metrics::record_cache(&inner.name, "hit");
                if let Some(observer) = &inner.on_hit {
                    observer(&key);
                }
                return Ok(value);
            }
            Ok(None) => {
                tracing::debug!(policy = %inner.name, key = %key, "Cache miss");
                metrics::record_cache(&inner.name, "miss");
                if let Some(observer) = &inner.on_miss {
                    observer(&key);
                }
            }
            Err(err) => inner.store_error(&key, &err),
        }

        let outcome = next(ctx).await;

        if let Ok(value) = &outcome {
            if (inner.cacheable)(&outcome) {
                match inner.store.put(&key, value.clone(), inner.ttl) {
                    Ok(()) => {
                        metrics::record_cache(&inner.name, "put");
                        if let Some(observer) = &inner.on_put {
                            observer(&key);
                        }
                    }
                    Err(err) => inner.store_error(&key, &err),
                }
            }
        }
        outcome
    }
}

impl<T: Clone + Send + Sync + 'static> Policy<T> for CachePolicy<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        self.clone().run(ctx, next).boxed()
    }
}

pub struct CachePolicyBuilder<T> {
    name: String,
    ttl: Duration,
    store: Option<Arc<dyn CacheStore<T>>>,
    key_fn: KeyFn,
    cacheable: OutcomePredicate<T>,
    on_hit: Option<CacheObserver>,
    on_miss: Option<CacheObserver>,
    on_put: Option<CacheObserver>,
    on_error: Option<CacheErrorObserver>,
}

impl<T: Clone + Send + Sync + 'static> CachePolicyBuilder<T> {
    /// Defaults to a private [`MemoryCacheStore`].
    pub fn store(mut self, store: Arc<dyn CacheStore<T>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to the context's cache key, falling back to its operation key.
    pub fn key<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Option<String> + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Restrict which successful outcomes are stored.
    pub fn cacheable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        self.cacheable = Arc::new(predicate);
        self
    }

    pub fn on_hit<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_hit = Some(Arc::new(observer));
        self
    }

    pub fn on_miss<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_miss = Some(Arc::new(observer));
        self
    }

    pub fn on_put<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_put = Some(Arc::new(observer));
        self
    }

    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, &CacheStoreError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> CachePolicy<T> {
        let store = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryCacheStore::<T>::new()) as Arc<dyn CacheStore<T>>,
        };
        CachePolicy {
            inner: Arc::new(CacheInner {
                name: self.name,
                ttl: self.ttl,
                store,
                key_fn: self.key_fn,
                cacheable: self.cacheable,
                on_hit: self.on_hit,
                on_miss: self.on_miss,
                on_put: self.on_put,
                on_error: self.on_error,
            }),
        }
    }
}
