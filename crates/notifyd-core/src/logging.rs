//! Logging setup.
//!
//! Structured `tracing` output on stderr: compact human-readable lines by
//! default, JSON lines when `TAVOLA_LOG_JSON=1` (for shipping to a log
//! collector). A `RUST_LOG` directive wins over the configured level.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `level` is the fallback filter directive when `RUST_LOG` is unset,
/// e.g. `"info"` or `"invoice_delivery=debug,info"`. Calling this twice
/// is harmless; the second call leaves the first subscriber in place,
/// which is what embedded and test use want.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json = std::env::var("TAVOLA_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // Err means a subscriber is already installed.
    let _ = result;
}
