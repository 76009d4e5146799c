//! Fallback substitution.
//!
//! Replaces outcomes the predicate rejects (errors, or successful results the
//! caller deems unacceptable) with a substitute. Usually the outermost policy
//! so it also covers rejections raised by inner policies.

use std::sync::Arc;

use futures_util::future::FutureExt;

use crate::observability::metrics;
use crate::resilience::context::ExecutionContext;
use crate::resilience::error::Outcome;
use crate::resilience::pipeline::{BoxOutcome, Operation, OutcomePredicate, Policy};

/// Computes the substitute from the rejected outcome.
pub type Substitute<T> = Arc<dyn Fn(&Outcome<T>, &ExecutionContext) -> Outcome<T> + Send + Sync>;
pub type FallbackObserver<T> = Arc<dyn Fn(&Outcome<T>, &ExecutionContext) + Send + Sync>;

pub struct FallbackPolicy<T> {
    inner: Arc<FallbackInner<T>>,
}

struct FallbackInner<T> {
    name: String,
    should_handle: OutcomePredicate<T>,
    substitute: Substitute<T>,
    on_fallback: Option<FallbackObserver<T>>,
}

impl<T> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("name", &self.inner.name)
            .finish()
    }
}

impl<T: Send + 'static> FallbackPolicy<T> {
    /// Substitute a fixed value.
    pub fn value(name: impl Into<String>, value: T) -> FallbackPolicyBuilder<T>
    where
        T: Clone + Sync,
    {
        Self::compute(name, move |_, _| Ok(value.clone()))
    }

    /// Substitute an outcome computed from the rejected one.
    pub fn compute<F>(name: impl Into<String>, substitute: F) -> FallbackPolicyBuilder<T>
    where
        F: Fn(&Outcome<T>, &ExecutionContext) -> Outcome<T> + Send + Sync + 'static,
    {
        FallbackPolicyBuilder {
            name: name.into(),
            should_handle: Arc::new(|outcome: &Outcome<T>| outcome.is_err()),
            substitute: Arc::new(substitute),
            on_fallback: None,
        }
    }

    async fn run(self, ctx: ExecutionContext, next: Operation<T>) -> Outcome<T> {
        let outcome = next(ctx.clone()).await;
        let inner = &self.inner;
        if !(inner.should_handle)(&outcome) {
            return outcome;
        }

        match &outcome {
            Err(e) => {
                tracing::info!(policy = %inner.name, error = %e, "Falling back to substitute")
            }
            Ok(_) => tracing::info!(policy = %inner.name, "Falling back on unacceptable result"),
        }
        metrics::record_fallback(&inner.name);
        if let Some(observer) = &inner.on_fallback {
            observer(&outcome, &ctx);
        }
        (inner.substitute)(&outcome, &ctx)
    }
}

impl<T: Send + 'static> Policy<T> for FallbackPolicy<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        self.clone().run(ctx, next).boxed()
    }
}

pub struct FallbackPolicyBuilder<T> {
    name: String,
    should_handle: OutcomePredicate<T>,
    substitute: Substitute<T>,
    on_fallback: Option<FallbackObserver<T>>,
}

impl<T: Send + 'static> FallbackPolicyBuilder<T> {
    /// Decide which outcomes are replaced; defaults to any error.
    pub fn handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        self.should_handle = Arc::new(predicate);
        self
    }

    pub fn on_fallback<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Outcome<T>, &ExecutionContext) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> FallbackPolicy<T> {
        FallbackPolicy {
            inner: Arc::new(FallbackInner {
                name: self.name,
                should_handle: self.should_handle,
                substitute: self.substitute,
                on_fallback: self.on_fallback,
            }),
        }
    }
}
