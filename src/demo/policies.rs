//! Standard policy registry for HTTP calls.
//!
//! Builds the named policies the demo client uses, from configuration:
//!
//! | name              | behavior                                              |
//! |-------------------|-------------------------------------------------------|
//! | `retry`           | retry transient HTTP errors after each configured delay |
//! | `circuit-breaker` | open after consecutive throttled responses            |
//! | `fallback`        | pipeline: fallback → retry → circuit-breaker          |
//! | `timeout`         | deadline per call                                     |
//! | `cache`           | short-lived cache of successful responses             |
//! | `bulkhead`        | bound concurrent calls, queue the overflow            |
//!
//! The client pipeline is `fallback → timeout → cache → bulkhead`.

use crate::config::schema::EngineConfig;
use crate::http::client::{status_is, transient_http_error, unsuccessful, HttpResponse};
use crate::resilience::backoff::delays_from_millis;
use crate::resilience::bulkhead::BulkheadPolicy;
use crate::resilience::cache::CachePolicy;
use crate::resilience::circuit_breaker::CircuitBreakerPolicy;
use crate::resilience::error::Outcome;
use crate::resilience::fallback::FallbackPolicy;
use crate::resilience::pipeline::Pipeline;
use crate::resilience::registry::{PolicyRegistry, RegistryError};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::TimeoutPolicy;

pub const RETRY: &str = "retry";
pub const CIRCUIT_BREAKER: &str = "circuit-breaker";
pub const FALLBACK: &str = "fallback";
pub const TIMEOUT: &str = "timeout";
pub const CACHE: &str = "cache";
pub const BULKHEAD: &str = "bulkhead";

pub const CLIENT_PIPELINE: &[&str] = &[FALLBACK, TIMEOUT, CACHE, BULKHEAD];

pub fn standard_registry(config: &EngineConfig) -> Result<PolicyRegistry<HttpResponse>, RegistryError> {
    let registry: PolicyRegistry<HttpResponse> = PolicyRegistry::new();

    registry.add(RETRY, retry_policy(config))?;
    registry.add(CIRCUIT_BREAKER, circuit_breaker_policy(config))?;

    // Shares the retry and breaker instances registered above.
    let fallback = Pipeline::builder(FALLBACK)
        .policy(fallback_policy(config))
        .registered(&registry, RETRY)?
        .registered(&registry, CIRCUIT_BREAKER)?
        .build();
    registry.add(FALLBACK, fallback)?;

    registry.add(TIMEOUT, TimeoutPolicy::new(TIMEOUT, config.timeout.duration()))?;

    let cache = CachePolicy::builder(CACHE, config.cache.ttl())
        .cacheable(|outcome: &Outcome<HttpResponse>| !unsuccessful(outcome))
        .build();
    registry.add(CACHE, cache)?;

    registry.add(
        BULKHEAD,
        BulkheadPolicy::new(
            BULKHEAD,
            config.bulkhead.max_parallelization,
            config.bulkhead.max_queuing,
        ),
    )?;

    tracing::info!(policies = ?registry.names(), "Standard policy registry ready");
    Ok(registry)
}

/// `fallback → timeout → cache → bulkhead`, resolved from `registry`.
pub fn client_pipeline(registry: &PolicyRegistry<HttpResponse>) -> Result<Pipeline<HttpResponse>, RegistryError> {
    CLIENT_PIPELINE
        .iter()
        .try_fold(Pipeline::builder("client"), |builder, name| {
            builder.registered(registry, name)
        })
        .map(|builder| builder.build())
}

/// Pipeline holding the single registered policy `name`.
pub fn single(registry: &PolicyRegistry<HttpResponse>, name: &str) -> Result<Pipeline<HttpResponse>, RegistryError> {
    Ok(Pipeline::builder(name).registered(registry, name)?.build())
}

fn retry_policy(config: &EngineConfig) -> RetryPolicy<HttpResponse> {
    RetryPolicy::builder(RETRY)
        .delays(delays_from_millis(&config.retry.delays_ms))
        .handle(transient_http_error)
        .on_retry(|outcome: &Outcome<HttpResponse>, delay, attempt| {
            let cause = match outcome {
                Ok(response) => format!("status {}", response.status),
                Err(e) => e.to_string(),
            };
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, %cause, "Retrying request");
        })
        .build()
}

fn circuit_breaker_policy(config: &EngineConfig) -> CircuitBreakerPolicy<HttpResponse> {
    let cb = &config.circuit_breaker;
    CircuitBreakerPolicy::builder(CIRCUIT_BREAKER)
        .failure_threshold(cb.failure_threshold)
        .break_duration(cb.break_duration())
        .handle(status_is(cb.failure_status))
        .on_break(|_, duration| {
            tracing::warn!(break_ms = duration.as_millis() as u64, "Circuit broken");
        })
        .on_reset(|| tracing::info!("Circuit reset"))
        .on_half_open(|| tracing::info!("Circuit half-open, sending trial request"))
        .build()
}

fn fallback_policy(config: &EngineConfig) -> FallbackPolicy<HttpResponse> {
    let substitute = HttpResponse::new(config.fallback.status, config.fallback.body.clone());
    FallbackPolicy::value(FALLBACK, substitute)
        .handle(unsuccessful)
        .on_fallback(|outcome: &Outcome<HttpResponse>, ctx| {
            let cause = match outcome {
                Ok(response) => format!("status {}", response.status),
                Err(e) => e.kind().to_string(),
            };
            tracing::info!(%cause, correlation_id = %ctx.correlation_id(), "Serving fallback response");
        })
        .build()
}
