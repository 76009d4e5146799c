//! Demo HTTP server.
//!
//! # Responsibilities
//! - Serve endpoints that misbehave in controlled, repeatable ways
//! - Keep per-endpoint call counters so failures end after a configured count
//! - Wire up tracing middleware and graceful shutdown
//!
//! # Endpoints
//! - `GET /demo/retry`: 500 for the first N calls, then `["Hello","World"]`
//! - `GET /demo/circuit-breaker`: 429 for the first M calls, then `OK`
//! - `GET /demo/always-fail`: always 500
//! - `GET /demo/timeout`: stalls past the client deadline, then `OK`
//! - `GET /demo/cache`: alternates `OK` and `Degraded`, tagged with the call number
//! - `GET /demo/bulkhead`: slow `OK`, no concurrency limit

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::schema::ServerConfig;

const RETRY: &str = "retry";
const CIRCUIT_BREAKER: &str = "circuit-breaker";
const CACHE: &str = "cache";

/// Shared handler state.
#[derive(Clone)]
pub struct DemoState {
    config: Arc<ServerConfig>,
    counters: Arc<DashMap<&'static str, u32>>,
    bulkhead_in_flight: Arc<AtomicUsize>,
    bulkhead_peak: Arc<AtomicUsize>,
}

impl DemoState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            counters: Arc::new(DashMap::new()),
            bulkhead_in_flight: Arc::new(AtomicUsize::new(0)),
            bulkhead_peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bump the counter for `endpoint` and return the new count. Once the
    /// count passes `reset_after` the counter restarts from zero.
    fn count(&self, endpoint: &'static str, reset_after: Option<u32>) -> u32 {
        let mut entry = self.counters.entry(endpoint).or_insert(0);
        *entry += 1;
        let n = *entry;
        if reset_after.is_some_and(|limit| n > limit) {
            *entry = 0;
        }
        n
    }

    /// Highest number of concurrent `/demo/bulkhead` calls seen so far.
    pub fn bulkhead_peak(&self) -> usize {
        self.bulkhead_peak.load(Ordering::SeqCst)
    }
}

/// Demo server.
pub struct DemoServer {
    router: Router,
    state: DemoState,
}

impl DemoServer {
    pub fn new(config: ServerConfig) -> Self {
        let state = DemoState::new(config);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    fn build_router(state: DemoState) -> Router {
        let demo = Router::new()
            .route("/retry", get(retry_handler))
            .route("/circuit-breaker", get(circuit_breaker_handler))
            .route("/always-fail", get(always_fail_handler))
            .route("/timeout", get(timeout_handler))
            .route("/cache", get(cache_handler))
            .route("/bulkhead", get(bulkhead_handler));

        Router::new()
            .nest("/demo", demo)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &DemoState {
        &self.state
    }

    /// Run until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Run until `signal` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, listener: TcpListener, signal: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Demo server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await?;

        tracing::info!("Demo server stopped");
        Ok(())
    }
}

async fn retry_handler(State(state): State<DemoState>) -> Response {
    let limit = state.config.retry_failures;
    let n = state.count(RETRY, Some(limit));
    if n <= limit {
        tracing::info!(call = n, "Retry endpoint failing");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }
    Json(vec!["Hello", "World"]).into_response()
}

async fn circuit_breaker_handler(State(state): State<DemoState>) -> Response {
    let limit = state.config.throttled_calls;
    let n = state.count(CIRCUIT_BREAKER, Some(limit));
    if n <= limit {
        tracing::info!(call = n, "Circuit breaker endpoint throttling");
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }
    (StatusCode::OK, "OK").into_response()
}

async fn always_fail_handler() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

async fn timeout_handler(State(state): State<DemoState>) -> impl IntoResponse {
    tokio::time::sleep(state.config.slow_response()).await;
    (StatusCode::OK, "OK")
}

async fn cache_handler(State(state): State<DemoState>) -> impl IntoResponse {
    let n = state.count(CACHE, None);
    let health = if n % 2 == 1 { "OK" } else { "Degraded" };
    (StatusCode::OK, format!("{health} (call {n})"))
}

async fn bulkhead_handler(State(state): State<DemoState>) -> impl IntoResponse {
    let now = state.bulkhead_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.bulkhead_peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(state.config.bulkhead_work()).await;
    state.bulkhead_in_flight.fetch_sub(1, Ordering::SeqCst);
    (StatusCode::OK, "OK")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
