//! Policy composition.
//!
//! A [`Pipeline`] is an ordered list of policies, outermost first. Wrapping an
//! operation folds the list from the innermost policy outward, producing a
//! single call chain:
//!
//! ```text
//! Pipeline [fallback, retry, breaker]
//!     → fallback( retry( breaker( operation ) ) )
//! ```
//!
//! The pipeline owns only shared handles to its policies; operations are
//! owned by the caller and live for one `wrap`/`bind`.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::resilience::context::ExecutionContext;
use crate::resilience::error::Outcome;
use crate::resilience::registry::{PolicyRegistry, RegistryError};

/// Boxed future returned by operations and policies.
pub type BoxOutcome<T> = BoxFuture<'static, Outcome<T>>;

/// Caller-supplied unit of work. May be invoked any number of times.
pub type Operation<T> = Arc<dyn Fn(ExecutionContext) -> BoxOutcome<T> + Send + Sync>;

/// Predicate over an outcome, used to classify failures and results.
pub type OutcomePredicate<T> = Arc<dyn Fn(&Outcome<T>) -> bool + Send + Sync>;

/// Lift an async closure into an [`Operation`].
pub fn operation<T, F, Fut>(f: F) -> Operation<T>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    Arc::new(move |ctx: ExecutionContext| f(ctx).boxed())
}

/// One resilience behavior.
///
/// `execute` receives the next layer and decides whether, how often and under
/// which constraints to invoke it.
pub trait Policy<T>: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T>;
}

/// Ordered composition of policies.
pub struct Pipeline<T> {
    name: String,
    policies: Vec<Arc<dyn Policy<T>>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policies: self.policies.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("policies", &self.policy_names())
            .finish()
    }
}

impl<T> Pipeline<T> {
    /// Names of the policies, outermost first.
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<T> {
        PipelineBuilder {
            name: name.into(),
            policies: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Fold the policies around `operation`, innermost first.
    pub fn wrap(&self, operation: Operation<T>) -> Operation<T> {
        self.policies.iter().rev().fold(operation, |inner, policy| {
            let policy = Arc::clone(policy);
            let wrapped: Operation<T> =
                Arc::new(move |ctx: ExecutionContext| policy.execute(ctx, Arc::clone(&inner)));
            wrapped
        })
    }

    /// Build the call chain once for repeated execution.
    pub fn bind(&self, operation: Operation<T>) -> BoundPipeline<T> {
        BoundPipeline {
            name: self.name.clone(),
            chain: self.wrap(operation),
        }
    }

    pub async fn execute(&self, ctx: ExecutionContext, operation: Operation<T>) -> Outcome<T> {
        (self.wrap(operation))(ctx).await
    }
}

impl<T: Send + 'static> Policy<T> for Pipeline<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: ExecutionContext, next: Operation<T>) -> BoxOutcome<T> {
        (self.wrap(next))(ctx)
    }
}

/// Builder for [`Pipeline`]; the first policy added is the outermost.
pub struct PipelineBuilder<T> {
    name: String,
    policies: Vec<Arc<dyn Policy<T>>>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: Policy<T> + 'static,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Add a policy instance shared with other pipelines.
    pub fn shared(mut self, policy: Arc<dyn Policy<T>>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Add the policy registered under `name`.
    pub fn registered(
        self,
        registry: &PolicyRegistry<T>,
        name: &str,
    ) -> Result<Self, RegistryError> {
        let policy = registry.require(name)?;
        Ok(self.shared(policy))
    }

    pub fn build(self) -> Pipeline<T> {
        Pipeline {
            name: self.name,
            policies: self.policies,
        }
    }
}

/// A pipeline with its operation already folded in.
pub struct BoundPipeline<T> {
    name: String,
    chain: Operation<T>,
}

impl<T> Clone for BoundPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<T: Send + 'static> BoundPipeline<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execute(&self, ctx: ExecutionContext) -> BoxOutcome<T> {
        (self.chain)(ctx)
    }
}
