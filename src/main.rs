//! Demo server for the resilience engine.
//!
//! Serves the `/demo/*` endpoints the scenarios call. Each endpoint fails in
//! a scripted way so a policy has something to recover from.
//!
//! ```text
//!     resilience-cli ──▶ pipeline ──▶ HttpClient ──▶ demo server (this binary)
//!                        fallback                     /demo/retry
//!                        timeout                      /demo/circuit-breaker
//!                        cache                        /demo/always-fail
//!                        bulkhead                     /demo/timeout
//!                        retry                        /demo/cache
//!                        circuit breaker              /demo/bulkhead
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use resilience_engine::config::load_or_default;
use resilience_engine::http::DemoServer;
use resilience_engine::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilience-engine")]
#[command(about = "Demo server with scripted failures", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("resilience-engine v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.server.bind_address,
        retry_failures = config.server.retry_failures,
        throttled_calls = config.server.throttled_calls,
        slow_response_ms = config.server.slow_response_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let server = DemoServer::new(config.server);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
