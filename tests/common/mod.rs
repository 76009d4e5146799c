//! Shared utilities for integration tests.

use std::time::Duration;

use tokio::net::TcpListener;

use resilience_engine::config::EngineConfig;
use resilience_engine::http::{DemoServer, DemoState};

/// Config with every delay shrunk so end-to-end runs finish quickly.
#[allow(dead_code)]
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.server.slow_response_ms = 1_000;
    config.server.bulkhead_work_ms = 300;
    config.retry.delays_ms = vec![20, 40, 60];
    config.circuit_breaker.break_duration_ms = 300;
    config.timeout.timeout_ms = 150;
    config.cache.ttl_ms = 400;
    config.bulkhead.max_parallelization = 2;
    config.bulkhead.max_queuing = 3;
    config.client.bulkhead_callers = 8;
    config
}

/// Start the demo server on an ephemeral port and point the client config at it.
#[allow(dead_code)]
pub async fn start_demo_server(config: &mut EngineConfig) -> DemoState {
    let listener = TcpListener::bind(&config.server.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.client.base_url = format!("http://{addr}");

    let server = DemoServer::new(config.server.clone());
    let state = server.state().clone();
    tokio::spawn(async move {
        let _ = server.run_until(listener, std::future::pending()).await;
    });

    // Listener is already bound; give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    state
}
