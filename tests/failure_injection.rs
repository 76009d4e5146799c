//! End-to-end policy behavior against the demo server.

use std::time::Duration;

use resilience_engine::demo::{Scenario, ScenarioRunner};
use resilience_engine::http::HttpResponse;
use resilience_engine::{Outcome, PolicyError};

mod common;

fn body(outcome: &Outcome<HttpResponse>) -> (u16, String) {
    match outcome {
        Ok(response) => (response.status, response.body.clone()),
        Err(e) => panic!("expected a response, got {e}"),
    }
}

#[tokio::test]
async fn test_demo_endpoints_fail_then_recover() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let url = format!("{}/demo/retry", config.client.base_url);

    for _ in 0..3 {
        let res = client.get(&url).send().await.expect("Demo server unreachable");
        assert_eq!(res.status(), 500);
    }
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let words: Vec<String> = res.json().await.unwrap();
    assert_eq!(words, vec!["Hello", "World"]);

    // Counter reset: the next call fails again.
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 500);
}

#[tokio::test]
async fn test_retry_recovers_after_transient_errors() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let report = runner.run(Scenario::Retry).await.unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(body(&report.outcomes[0]), (200, r#"["Hello","World"]"#.to_string()));
    assert!(report.elapsed >= Duration::from_millis(120));
}

#[tokio::test]
async fn test_circuit_breaker_opens_and_recovers() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let report = runner.run(Scenario::CircuitBreaker).await.unwrap();
    let outcomes = &report.outcomes;
    assert_eq!(outcomes.len(), 6);
    for outcome in &outcomes[..3] {
        assert_eq!(body(outcome).0, 429);
    }
    for outcome in &outcomes[3..5] {
        assert!(matches!(outcome, Err(PolicyError::CircuitOpen { .. })));
    }
    assert_eq!(body(&outcomes[5]), (200, "OK".to_string()));
}

#[tokio::test]
async fn test_fallback_replaces_persistent_failure() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let report = runner.run(Scenario::Fallback).await.unwrap();
    assert_eq!(body(&report.outcomes[0]), (404, "Not found".to_string()));
}

#[tokio::test]
async fn test_timeout_gives_up_on_slow_endpoint() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let report = runner.run(Scenario::Timeout).await.unwrap();
    match &report.outcomes[0] {
        Err(PolicyError::Timeout { after, .. }) => assert_eq!(*after, Duration::from_millis(150)),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(report.elapsed < Duration::from_millis(900));
}

#[tokio::test]
async fn test_cache_serves_repeat_calls_until_expiry() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let report = runner.run(Scenario::Cache).await.unwrap();
    let bodies: Vec<String> = report.outcomes.iter().map(|o| body(o).1).collect();
    assert_eq!(bodies, vec!["OK (call 1)", "OK (call 1)", "Degraded (call 2)"]);
}

#[tokio::test]
async fn test_bulkhead_rejects_overflow() {
    let mut config = common::fast_config();
    let state = common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let report = runner.run(Scenario::Bulkhead).await.unwrap();
    let rejected = report
        .outcomes
        .iter()
        .filter(|o| matches!(o, Err(e) if e.is_bulkhead_rejected()))
        .count();
    assert_eq!(report.outcomes.len(), 8);
    assert_eq!(report.successes(), 5);
    assert_eq!(rejected, 3);
    assert!(state.bulkhead_peak() <= 2);
}

#[tokio::test]
async fn test_client_pipeline_falls_back_on_timeout() {
    let mut config = common::fast_config();
    common::start_demo_server(&mut config).await;
    let runner = ScenarioRunner::new(config).unwrap();

    let outcome = runner.call("/demo/timeout").await.unwrap();
    assert_eq!(body(&outcome), (404, "Not found".to_string()));

    let outcome = runner.call("/demo/retry").await.unwrap();
    assert_eq!(body(&outcome).0, 200);
}
