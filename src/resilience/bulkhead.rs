//! Concurrency bulkhead.
//!
//! # Responsibilities
//! - Bound the number of concurrent executions through one call site
//! - Queue a bounded number of extra callers, admitted in arrival order
//! - Reject immediately once both executions and queue are full
//!
//! # Design Decisions
//! - Two semaphores: admission (executions + queue) and execution
//! - Admission never waits; only the execution slot is awaited
//! - Tokio's semaphore is fair, which gives FIFO wake-up of queued callers
//! - Permits are RAII guards, released on completion, failure or drop
//! - The in-flight gauge is updated by the execution guard, including on drop

use std::sync::Arc;

use futures_util::future::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;
use crate::resilience::context::ExecutionContext;
use crate::resilience::error::{Outcome, PolicyError};
use crate::resilience::pipeline::{BoxOutcome, Operation, Policy};

pub type RejectionObserver = Arc<dyn Fn(&ExecutionContext) + Send + Sync>;

#[derive(Clone)]
pub struct BulkheadPolicy {
    inner: Arc<BulkheadInner>,
}

struct BulkheadInner {
    name: String,
    max_parallelization: usize,
    max_queuing: usize,
    admissions: Arc<Semaphore>,
    executions: Arc<Semaphore>,
    on_rejected: Option<RejectionObserver>,
}

impl std::fmt::Debug for BulkheadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkheadPolicy")
            .field("name", &self.inner.name)
            .field("max_parallelization", &self.inner.max_parallelization)
            .field("max_queuing", &self.inner.max_queuing)
            .field("available_execution_slots", &self.available_execution_slots())
            .finish()
    }
}

impl BulkheadPolicy {
    pub fn new(name: impl Into<String>, max_parallelization: usize, max_queuing: usize) -> Self {
        Self::builder(name)
            .max_parallelization(max_parallelization)
            .max_queuing(max_queuing)
            .build()
    }

    pub fn builder(name: impl Into<String>) -> BulkheadPolicyBuilder {
        BulkheadPolicyBuilder {
            name: name.into(),
            max_parallelization: 1,
            max_queuing: 0,
            on_rejected: None,
        }
    }

    pub fn max_parallelization(&self) -> usize {
        self.inner.max_parallelization
    }

    pub fn max_queuing(&self) -> usize {
        self.inner.max_queuing
    }

    pub fn available_execution_slots(&self) -> usize {
        self.inner.executions.available_permits()
    }

    pub fn available_queue_slots(&self) -> usize {
        self.inner
            .admissions
            .available_permits()
            .min(self.inner.max_queuing)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.max_parallelization - self.available_execution_slots()
    }

    fn reject(&self, ctx: &ExecutionContext) -> PolicyError {
        let inner = &self.inner;
        tracing::warn!(
            policy = %inner.name,
            max_parallelization = inner.max_parallelization,
            max_queuing = inner.max_queuing,
            "Bulkhead full, rejecting call"
        );
        let err = PolicyError::BulkheadRejected {
            policy: inner.name.clone(),
            max_parallelization: inner.max_parallelization,
            max_queuing: inner.max_queuing,
        };
        metrics::record_rejection(&inner.name, err.kind());
        if let Some(observer) = &inner.on_rejected {
            observer(ctx);
        }
        err
    }

    async fn run<T: Send + 'static>(self, ctx: ExecutionContext, next: Operation<T>) -> Outcome<T> {
        let _admission = match Arc::clone(&self.inner.admissions).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(self.reject(&ctx)),
        };

        let execution = tokio::select! {
            permit = Arc::clone(&self.inner.executions).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(self.reject(&ctx)),
            },
            _ = ctx.cancelled() => return Err(PolicyError::Cancelled),
        };
        let _slot = ExecutionSlot::occupy(execution, self);

        next(ctx).await
    }
}

/// Execution permit that keeps the in-flight gauge current.
///
/// Also runs when an outer layer drops the call mid-flight.
struct ExecutionSlot {
    permit: Option<OwnedSemaphorePermit>,
    bulkhead: BulkheadPolicy,
}

impl ExecutionSlot {
    fn occupy(permit: OwnedSemaphorePermit, bulkhead: BulkheadPolicy) -> Self {
        metrics::record_bulkhead_in_flight(&bulkhead.inner.name, bulkhead.in_flight());
        Self {
            permit: Some(permit),
            bulkhead,
        }
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        drop(self.permit.take());
        let bulkhead = &self.bulkhead;
        metrics::record_bulkhead_in_flight(&bulkhead.inner.name, bulkhead.in_flight());
    }
}

impl<T: Send + 'static> Policy<T> for BulkheadPolicy {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        self.clone().run(ctx, next).boxed()
    }
}

pub struct BulkheadPolicyBuilder {
    name: String,
    max_parallelization: usize,
    max_queuing: usize,
    on_rejected: Option<RejectionObserver>,
}

impl BulkheadPolicyBuilder {
    /// Clamped to at least 1.
    pub fn max_parallelization(mut self, max: usize) -> Self {
        self.max_parallelization = max.max(1);
        self
    }

    pub fn max_queuing(mut self, max: usize) -> Self {
        self.max_queuing = max;
        self
    }

    pub fn on_rejected<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ExecutionContext) + Send + Sync + 'static,
    {
        self.on_rejected = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> BulkheadPolicy {
        BulkheadPolicy {
            inner: Arc::new(BulkheadInner {
                name: self.name,
                max_parallelization: self.max_parallelization,
                max_queuing: self.max_queuing,
                admissions: Arc::new(Semaphore::new(self.max_parallelization + self.max_queuing)),
                executions: Arc::new(Semaphore::new(self.max_parallelization)),
                on_rejected: self.on_rejected,
            }),
        }
    }
}
