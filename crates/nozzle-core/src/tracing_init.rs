//! Process-wide `tracing` subscriber for the relay binary.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events are shown by default.
const CRATES: [&str; 2] = ["nozzle_relay", "nozzle_core"];

/// Default filter directive: our crates at `debug` when `debug` is set,
/// at `info` otherwise. Dependencies stay at the global default (`error`).
pub fn default_filter(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set and valid. With `log_json`
/// every line is a JSON object carrying the span fields (session id,
/// subscription id) for log aggregation.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_relay_crates() {
        assert_eq!(default_filter(false), "nozzle_relay=info,nozzle_core=info");
        assert_eq!(
            default_filter(true),
            "nozzle_relay=debug,nozzle_core=debug"
        );
    }

    #[test]
    fn default_filter_is_a_valid_directive() {
        assert!(EnvFilter::try_new(default_filter(true)).is_ok());
    }
}
