//! Retry with a configurable delay sequence.
//!
//! # Responsibilities
//! - Re-invoke the next layer while its outcome is retryable
//! - Wait the configured delay before each retry (one delay per retry)
//! - Stop early when the execution context is cancelled
//!
//! # Design Decisions
//! - The delay list bounds the attempt count: k delays means at most k+1 calls
//! - Waiting is a per-task timer; other invocations are never blocked
//! - The attempt number is published in the context under `retry.attempt`

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::FutureExt;

use crate::observability::metrics;
use crate::resilience::backoff;
use crate::resilience::context::{ExecutionContext, RETRY_ATTEMPT_KEY};
use crate::resilience::error::Outcome;
use crate::resilience::pipeline::{BoxOutcome, Operation, OutcomePredicate, Policy};

/// Observer called before each retry with the failed outcome, the upcoming
/// delay and the 1-based retry number.
pub type RetryObserver<T> = Arc<dyn Fn(&Outcome<T>, Duration, usize) + Send + Sync>;

pub struct RetryPolicy<T> {
    inner: Arc<RetryInner<T>>,
}

struct RetryInner<T> {
    name: String,
    delays: Vec<Duration>,
    should_retry: OutcomePredicate<T>,
    on_retry: Option<RetryObserver<T>>,
}

impl<T> Clone for RetryPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for RetryPolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.inner.name)
            .field("delays", &self.inner.delays)
            .finish()
    }
}

impl<T: Send + 'static> RetryPolicy<T> {
    pub fn builder(name: impl Into<String>) -> RetryPolicyBuilder<T> {
        RetryPolicyBuilder::new(name)
    }

    /// Maximum number of invocations of the next layer.
    pub fn max_attempts(&self) -> usize {
        self.inner.delays.len() + 1
    }

    pub fn delays(&self) -> &[Duration] {
        &self.inner.delays
    }

    async fn run(self, ctx: ExecutionContext, next: Operation<T>) -> Outcome<T> {
        let inner = &self.inner;
        let mut attempt = 0usize;

        loop {
            ctx.insert(RETRY_ATTEMPT_KEY, attempt);
            let outcome = next(ctx.clone()).await;

            if !(inner.should_retry)(&outcome) {
                return outcome;
            }
            let Some(&delay) = inner.delays.get(attempt) else {
                tracing::warn!(policy = %inner.name, attempts = attempt + 1, "Retries exhausted");
                return outcome;
            };
            if ctx.is_cancelled() {
                return outcome;
            }

            attempt += 1;
            tracing::debug!(
                policy = %inner.name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after retryable outcome"
            );
            metrics::record_retry(&inner.name);
            if let Some(observer) = &inner.on_retry {
                observer(&outcome, delay, attempt);
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancelled() => return outcome,
            }
        }
    }
}

impl<T: Send + 'static> Policy<T> for RetryPolicy<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        self.clone().run(ctx, next).boxed()
    }
}

pub struct RetryPolicyBuilder<T> {
    name: String,
    delays: Vec<Duration>,
    should_retry: OutcomePredicate<T>,
    on_retry: Option<RetryObserver<T>>,
}

impl<T: Send + 'static> RetryPolicyBuilder<T> {
    /// Defaults: no delays (single attempt), retry only operation failures.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delays: Vec::new(),
            should_retry: Arc::new(|outcome: &Outcome<T>| {
                matches!(outcome, Err(e) if e.is_operation())
            }),
            on_retry: None,
        }
    }

    pub fn delays(mut self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays = delays.into_iter().collect();
        self
    }

    /// Jittered exponential delays, capped at `max`.
    pub fn exponential(self, retries: u32, base: Duration, max: Duration) -> Self {
        self.delays(backoff::exponential_delays(retries, base, max))
    }

    pub fn constant(self, retries: u32, delay: Duration) -> Self {
        self.delays(backoff::constant_delays(retries, delay))
    }

    /// Decide which outcomes are retried.
    pub fn handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Outcome<T>, Duration, usize) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> RetryPolicy<T> {
        RetryPolicy {
            inner: Arc::new(RetryInner {
                name: self.name,
                delays: self.delays,
                should_retry: self.should_retry,
                on_retry: self.on_retry,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::error::PolicyError;
    use crate::resilience::pipeline::operation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Fails the first `failures` calls, then returns the call number.
    fn flaky(failures: usize, calls: &Arc<AtomicUsize>) -> Operation<usize> {
        let calls = Arc::clone(calls);
        operation(move |_ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < failures {
                    Err(PolicyError::message(format!("failure #{n}")))
                } else {
                    Ok(n + 1)
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_k_plus_one_times() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: RetryPolicy<usize> = RetryPolicy::builder("retry")
            .constant(3, Duration::from_millis(10))
            .build();

        let outcome = policy
            .execute(ExecutionContext::new(), flaky(usize::MAX, &calls))
            .await;

        assert!(outcome.unwrap_err().is_operation());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delays_means_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: RetryPolicy<usize> = RetryPolicy::builder("retry").build();

        let outcome = policy
            .execute(ExecutionContext::new(), flaky(usize::MAX, &calls))
            .await;

        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_waits_each_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let obs = Arc::clone(&observed);
        let policy: RetryPolicy<usize> = RetryPolicy::builder("retry")
            .delays([Duration::from_secs(1), Duration::from_secs(2)])
            .on_retry(move |_outcome, delay, attempt| {
                obs.lock().unwrap().push((attempt, delay));
            })
            .build();

        let ctx = ExecutionContext::new();
        let start = Instant::now();
        let outcome = policy.execute(ctx.clone(), flaky(2, &calls)).await;

        assert_eq!(outcome.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(
            *observed.lock().unwrap(),
            vec![(1, Duration::from_secs(1)), (2, Duration::from_secs(2))]
        );
        assert_eq!(ctx.retry_attempt(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_outcome_returns_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: RetryPolicy<usize> = RetryPolicy::builder("retry")
            .constant(5, Duration::from_secs(1))
            .handle(|outcome: &Outcome<usize>| {
                matches!(outcome, Err(PolicyError::Timeout { .. }))
            })
            .build();

        let outcome = policy
            .execute(ExecutionContext::new(), flaky(usize::MAX, &calls))
            .await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_waiting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: RetryPolicy<usize> = RetryPolicy::builder("retry")
            .constant(3, Duration::from_secs(60))
            .build();

        let ctx = ExecutionContext::new();
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let start = Instant::now();
        let outcome = policy.execute(ctx, flaky(usize::MAX, &calls)).await;
        assert!(outcome.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_result_classified_as_failure() {
        // Success values can be retryable too, e.g. an HTTP 503.
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: RetryPolicy<usize> = RetryPolicy::builder("retry")
            .constant(2, Duration::from_millis(5))
            .handle(|outcome: &Outcome<usize>| matches!(outcome, Ok(n) if *n < 3))
            .build();

        let c = Arc::clone(&calls);
        let op = operation(move |_ctx| {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n) }
        });
        let outcome = policy.execute(ExecutionContext::new(), op).await;
        assert_eq!(outcome.unwrap(), 3);
    }
}
