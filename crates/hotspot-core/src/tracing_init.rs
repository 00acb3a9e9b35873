//! Shared tracing/logging initialization.
//!
//! The server binary and the admin subcommands share one subscriber setup:
//! an env-filter plus optional JSON output for log aggregation.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the env-filter, preferring `RUST_LOG` over `default_filter`.
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()))
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"hotspot_server=info,hotspot_billing=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_filter: &str, log_json: bool) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok()
    }
}

/// Default filter for a log level, scoped to the workspace crates.
pub fn default_filter(level: &str) -> String {
    format!("hotspot_server={level},hotspot_billing={level},hotspot_core={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_workspace_crates() {
        let filter = default_filter("debug");
        assert!(filter.contains("hotspot_billing=debug"));
        assert!(filter.contains("hotspot_server=debug"));
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        let _ = init_tracing("off", false);
        assert!(!init_tracing("off", true));
    }
}
