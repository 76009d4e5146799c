use std::path::PathBuf;

use clap::{Parser, Subcommand};

use resilience_engine::config::load_or_default;
use resilience_engine::demo::{Scenario, ScenarioReport, ScenarioRunner};
use resilience_engine::http::HttpResponse;
use resilience_engine::observability::{logging, metrics};
use resilience_engine::Outcome;

#[derive(Parser)]
#[command(name = "resilience-cli")]
#[command(about = "Run resilience scenarios against the demo server", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured demo server URL.
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retry a failing endpoint until it recovers
    Retry,
    /// Trip the circuit breaker, wait out the break, recover
    CircuitBreaker,
    /// Substitute a fallback response for a permanently failing endpoint
    Fallback,
    /// Give up on a slow endpoint
    Timeout,
    /// Serve repeated calls from cache until the entry expires
    Cache,
    /// Flood a slow endpoint past the bulkhead's capacity
    Bulkhead,
    /// Run every scenario in turn
    All,
    /// GET a path once through the full client pipeline
    Call {
        #[arg(default_value = "/demo/retry")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.client.base_url = url;
    }

    logging::init_logging(&config.observability.log_level);
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let runner = ScenarioRunner::new(config)?;

    let scenarios = match cli.command {
        Commands::Retry => vec![Scenario::Retry],
        Commands::CircuitBreaker => vec![Scenario::CircuitBreaker],
        Commands::Fallback => vec![Scenario::Fallback],
        Commands::Timeout => vec![Scenario::Timeout],
        Commands::Cache => vec![Scenario::Cache],
        Commands::Bulkhead => vec![Scenario::Bulkhead],
        Commands::All => Scenario::ALL.to_vec(),
        Commands::Call { path } => {
            let outcome = runner.call(&path).await?;
            println!("{}", describe(&outcome));
            return Ok(());
        }
    };

    for scenario in scenarios {
        let report = runner.run(scenario).await?;
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!(
        "== {} ({} calls, {} succeeded, {:.1}s)",
        report.scenario.as_str(),
        report.outcomes.len(),
        report.successes(),
        report.elapsed.as_secs_f64()
    );
    for (i, outcome) in report.outcomes.iter().enumerate() {
        println!("  #{:<3} {}", i + 1, describe(outcome));
    }
}

fn describe(outcome: &Outcome<HttpResponse>) -> String {
    match outcome {
        Ok(response) => format!("{} {}", response.status, response.body),
        Err(e) => format!("error ({}): {}", e.kind(), e),
    }
}
