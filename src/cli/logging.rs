//! Tracing setup for the binary. The library only emits events.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding a filter directive, e.g. `NESTPM_LOG=nestpm=debug`.
pub const LOG_ENV: &str = "NESTPM_LOG";

/// `verbosity`: 0 = warn, 1 = info, 2 = debug, 3+ = trace. `NESTPM_LOG`
/// replaces the whole filter when set.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(format!("nestpm={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
