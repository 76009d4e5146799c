//! HTTP operations for the resilience pipeline.
//!
//! # Responsibilities
//! - Turn a GET on a path into an [`Operation`] a pipeline can invoke repeatedly
//! - Map transport failures to operation errors and honour cancellation
//! - Provide the outcome predicates policies use to classify responses
//!
//! # Design Decisions
//! - Non-2xx statuses are successful outcomes; policies decide what a bad
//!   status means through predicates
//! - One pooled `reqwest::Client` shared by every operation

use serde::{Deserialize, Serialize};
use url::Url;

use crate::resilience::context::ExecutionContext;
use crate::resilience::error::{Outcome, PolicyError};
use crate::resilience::pipeline::{operation, Operation};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Status and body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: Url,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self, HttpClientError> {
        let base_url = Url::parse(base_url)?;
        // Demo traffic targets a local server; ignore system proxies.
        let inner = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self { inner, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` relative to the base URL, once per invocation.
    pub fn get(&self, path: &str) -> Operation<HttpResponse> {
        let client = self.inner.clone();
        let url = self.base_url.join(path);

        operation(move |ctx: ExecutionContext| {
            let client = client.clone();
            let url = url.clone();
            async move {
                let url = url.map_err(PolicyError::operation)?;
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => Err(PolicyError::Cancelled),
                    outcome = send(&client, url, &ctx) => outcome,
                }
            }
        })
    }
}

async fn send(client: &reqwest::Client, url: Url, ctx: &ExecutionContext) -> Outcome<HttpResponse> {
    tracing::debug!(url = %url, correlation_id = %ctx.correlation_id(), "Sending request");
    let response = client
        .get(url)
        .header(CORRELATION_HEADER, ctx.correlation_id().to_string())
        .send()
        .await
        .map_err(PolicyError::operation)?;

    let status = response.status().as_u16();
    let body = response.text().await.map_err(PolicyError::operation)?;
    Ok(HttpResponse { status, body })
}

/// Transport errors, timeouts, 5xx and 408.
pub fn transient_http_error(outcome: &Outcome<HttpResponse>) -> bool {
    match outcome {
        Ok(response) => response.status >= 500 || response.status == 408,
        Err(err) => err.is_operation() || err.is_timeout(),
    }
}

/// Matches responses with exactly this status.
pub fn status_is(code: u16) -> impl Fn(&Outcome<HttpResponse>) -> bool + Clone + Send + Sync + 'static {
    move |outcome: &Outcome<HttpResponse>| matches!(outcome, Ok(response) if response.status == code)
}

/// Any error or non-2xx response.
pub fn unsuccessful(outcome: &Outcome<HttpResponse>) -> bool {
    !matches!(outcome, Ok(response) if response.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok(status: u16) -> Outcome<HttpResponse> {
        Ok(HttpResponse::new(status, ""))
    }

    #[test]
    fn test_transient_classification() {
        assert!(transient_http_error(&ok(500)));
        assert!(transient_http_error(&ok(503)));
        assert!(transient_http_error(&ok(408)));
        assert!(!transient_http_error(&ok(429)));
        assert!(!transient_http_error(&ok(200)));
        assert!(transient_http_error(&Err(PolicyError::message("connection reset"))));
        assert!(transient_http_error(&Err(PolicyError::Timeout {
            policy: "timeout".into(),
            after: Duration::from_secs(3),
        })));
        assert!(!transient_http_error(&Err(PolicyError::CircuitOpen {
            policy: "cb".into(),
            retry_after: Duration::from_secs(1),
        })));
    }

    #[test]
    fn test_status_and_success_predicates() {
        let throttled = status_is(429);
        assert!(throttled(&ok(429)));
        assert!(!throttled(&ok(500)));
        assert!(!throttled(&Err(PolicyError::Cancelled)));

        assert!(unsuccessful(&ok(404)));
        assert!(unsuccessful(&Err(PolicyError::Cancelled)));
        assert!(!unsuccessful(&ok(204)));
    }

    #[test]
    fn test_rejects_relative_base_url() {
        assert!(matches!(
            HttpClient::new("/demo"),
            Err(HttpClientError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts_request() {
        // Nothing listens on port 9; cancellation is checked first.
        let client = HttpClient::new("http://127.0.0.1:9").unwrap();
        let ctx = ExecutionContext::new();
        ctx.cancellation().cancel();
        let outcome = client.get("/demo/retry")(ctx).await;
        assert!(matches!(outcome, Err(PolicyError::Cancelled)));
    }
}
