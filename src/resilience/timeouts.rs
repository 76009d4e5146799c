//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race the next layer against a deadline
//! - Signal cooperative cancellation to inner layers when the deadline wins
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Work the operation spawned elsewhere is only asked to stop via the
//!   context's cancellation token, never forcibly terminated
//! - Timeout errors are distinct from other errors

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::FutureExt;

use crate::observability::metrics;
use crate::resilience::context::ExecutionContext;
use crate::resilience::error::{Outcome, PolicyError};
use crate::resilience::pipeline::{BoxOutcome, Operation, Policy};

pub type TimeoutObserver = Arc<dyn Fn(&ExecutionContext, Duration) + Send + Sync>;

#[derive(Clone)]
pub struct TimeoutPolicy {
    name: Arc<str>,
    duration: Duration,
    on_timeout: Option<TimeoutObserver>,
}

impl std::fmt::Debug for TimeoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutPolicy")
            .field("name", &self.name)
            .field("duration", &self.duration)
            .finish()
    }
}

impl TimeoutPolicy {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: Arc::from(name.into()),
            duration,
            on_timeout: None,
        }
    }

    pub fn on_timeout<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ExecutionContext, Duration) + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(observer));
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    async fn run<T: Send + 'static>(self, ctx: ExecutionContext, next: Operation<T>) -> Outcome<T> {
        let inner_ctx = ctx.child();
        let token = inner_ctx.cancellation().clone();

        match tokio::time::timeout(self.duration, next(inner_ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                token.cancel();
                tracing::warn!(
                    policy = %self.name,
                    timeout_ms = self.duration.as_millis() as u64,
                    correlation_id = %ctx.correlation_id(),
                    "Operation timed out"
                );
                metrics::record_timeout(&self.name);
                if let Some(observer) = &self.on_timeout {
                    observer(&ctx, self.duration);
                }
                Err(PolicyError::Timeout {
                    policy: self.name.to_string(),
                    after: self.duration,
                })
            }
        }
    }
}

impl<T: Send + 'static> Policy<T> for TimeoutPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        self.clone().run(ctx, next).boxed()
    }
}
