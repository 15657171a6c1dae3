//! Diagnostic output for the binary.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter, e.g. `magnifier_core=debug`.
pub const LOG_ENV: &str = "MAGNIFIER_LOG";

/// Install a stderr subscriber filtered by [`LOG_ENV`], defaulting to `warn`.
///
/// Calling this more than once keeps the first subscriber.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init();
}
