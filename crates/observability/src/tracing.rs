//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Verbosity follows `RUST_LOG` (default `info`); output format follows
/// `BAKEHOUSE_LOG_FORMAT` (`json` for machine-readable logs, anything else
/// for compact human-readable output).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match std::env::var("BAKEHOUSE_LOG_FORMAT").as_deref() {
        Ok("json") => {
            let _ = builder
                .json()
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .try_init();
        }
        _ => {
            let _ = builder.compact().try_init();
        }
    }
}
