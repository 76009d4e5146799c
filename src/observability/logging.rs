//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}

/// Filter directives applying `level` to the engine's own targets.
fn default_directives(level: &str) -> String {
    ["resilience_engine", "resilience_cli", "tower_http"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_engine_targets() {
        assert_eq!(
            default_directives("debug"),
            "resilience_engine=debug,resilience_cli=debug,tower_http=debug"
        );
    }

    #[test]
    fn test_default_directives_parse() {
        let filter = EnvFilter::try_new(default_directives("warn"));
        assert!(filter.is_ok());
    }
}
