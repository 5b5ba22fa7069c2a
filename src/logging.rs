//! Tracing subscriber setup for the binary
//!
//! The library only emits `tracing` events. Exporter output arrives on the
//! `exporter` target, one event per line.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default directive when `RUST_LOG` is unset
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Install a stderr `fmt` subscriber
///
/// `RUST_LOG` always takes precedence; otherwise `verbose` selects debug
/// over info. Installing twice is a no-op.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init();
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_selects_debug() {
        assert_eq!(default_directive(true), "debug");
        assert_eq!(default_directive(false), "info");
    }

    #[test]
    fn init_is_idempotent() {
        init(false);
        init(true);
        tracing::info!(target: "exporter", "still logging");
    }
}
