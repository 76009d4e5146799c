//! Runnable demonstrations of each policy against the demo server.
//!
//! Each scenario resolves its pipeline from the standard registry, drives one
//! or more calls and returns every outcome in call order.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::Instant;

use crate::config::schema::EngineConfig;
use crate::demo::policies::{self, standard_registry};
use crate::http::client::{HttpClient, HttpClientError, HttpResponse};
use crate::resilience::context::ExecutionContext;
use crate::resilience::error::Outcome;
use crate::resilience::pipeline::Pipeline;
use crate::resilience::registry::{PolicyRegistry, RegistryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Retry,
    CircuitBreaker,
    Fallback,
    Timeout,
    Cache,
    Bulkhead,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Retry,
        Scenario::CircuitBreaker,
        Scenario::Fallback,
        Scenario::Timeout,
        Scenario::Cache,
        Scenario::Bulkhead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Retry => "retry",
            Scenario::CircuitBreaker => "circuit-breaker",
            Scenario::Fallback => "fallback",
            Scenario::Timeout => "timeout",
            Scenario::Cache => "cache",
            Scenario::Bulkhead => "bulkhead",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Client(#[from] HttpClientError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outcomes of one scenario run, in call order.
#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub outcomes: Vec<Outcome<HttpResponse>>,
    pub elapsed: Duration,
}

impl ScenarioReport {
    pub fn successes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, Ok(r) if r.is_success()))
            .count()
    }
}

/// Client plus the registry it draws its pipelines from.
pub struct ScenarioRunner {
    config: EngineConfig,
    client: HttpClient,
    registry: PolicyRegistry<HttpResponse>,
}

impl ScenarioRunner {
    pub fn new(config: EngineConfig) -> Result<Self, ScenarioError> {
        let client = HttpClient::new(&config.client.base_url)?;
        let registry = standard_registry(&config)?;
        Ok(Self {
            config,
            client,
            registry,
        })
    }

    pub fn registry(&self) -> &PolicyRegistry<HttpResponse> {
        &self.registry
    }

    pub async fn run(&self, scenario: Scenario) -> Result<ScenarioReport, ScenarioError> {
        tracing::info!(scenario = scenario.as_str(), "Running scenario");
        let start = Instant::now();
        let outcomes = match scenario {
            Scenario::Retry => self.retry().await?,
            Scenario::CircuitBreaker => self.circuit_breaker().await?,
            Scenario::Fallback => self.fallback().await?,
            Scenario::Timeout => self.timeout().await?,
            Scenario::Cache => self.cache().await?,
            Scenario::Bulkhead => self.bulkhead().await?,
        };
        Ok(ScenarioReport {
            scenario,
            outcomes,
            elapsed: start.elapsed(),
        })
    }

    /// GET `path` once through the full client pipeline.
    pub async fn call(&self, path: &str) -> Result<Outcome<HttpResponse>, ScenarioError> {
        let pipeline = policies::client_pipeline(&self.registry)?;
        Ok(self.send(&pipeline, path).await)
    }

    async fn send(&self, pipeline: &Pipeline<HttpResponse>, path: &str) -> Outcome<HttpResponse> {
        let ctx = ExecutionContext::for_operation(format!("GET {path}"));
        pipeline.execute(ctx, self.client.get(path)).await
    }

    async fn retry(&self) -> Result<Vec<Outcome<HttpResponse>>, ScenarioError> {
        let pipeline = policies::single(&self.registry, policies::RETRY)?;
        Ok(vec![self.send(&pipeline, "/demo/retry").await])
    }

    /// Calls until the breaker has opened and rejected a few times, waits out
    /// the break, then sends the trial call.
    async fn circuit_breaker(&self) -> Result<Vec<Outcome<HttpResponse>>, ScenarioError> {
        let pipeline = policies::single(&self.registry, policies::CIRCUIT_BREAKER)?;
        let cb = &self.config.circuit_breaker;
        let mut outcomes = Vec::new();
        for _ in 0..cb.failure_threshold + 2 {
            outcomes.push(self.send(&pipeline, "/demo/circuit-breaker").await);
        }
        tokio::time::sleep(cb.break_duration()).await;
        outcomes.push(self.send(&pipeline, "/demo/circuit-breaker").await);
        Ok(outcomes)
    }

    async fn fallback(&self) -> Result<Vec<Outcome<HttpResponse>>, ScenarioError> {
        let pipeline = policies::single(&self.registry, policies::FALLBACK)?;
        Ok(vec![self.send(&pipeline, "/demo/always-fail").await])
    }

    async fn timeout(&self) -> Result<Vec<Outcome<HttpResponse>>, ScenarioError> {
        let pipeline = policies::single(&self.registry, policies::TIMEOUT)?;
        Ok(vec![self.send(&pipeline, "/demo/timeout").await])
    }

    /// Two calls inside one ttl, then one after it expires.
    async fn cache(&self) -> Result<Vec<Outcome<HttpResponse>>, ScenarioError> {
        let pipeline = policies::single(&self.registry, policies::CACHE)?;
        let ttl = self.config.cache.ttl();
        let mut outcomes = vec![self.send(&pipeline, "/demo/cache").await];
        outcomes.push(self.send(&pipeline, "/demo/cache").await);
        tokio::time::sleep(ttl + ttl / 2).await;
        outcomes.push(self.send(&pipeline, "/demo/cache").await);
        Ok(outcomes)
    }

    /// Launches every configured caller at once.
    async fn bulkhead(&self) -> Result<Vec<Outcome<HttpResponse>>, ScenarioError> {
        let pipeline = policies::single(&self.registry, policies::BULKHEAD)?;
        let calls = (0..self.config.client.bulkhead_callers)
            .map(|_| self.send(&pipeline, "/demo/bulkhead"));
        Ok(join_all(calls).await)
    }
}
