//! Tracing setup for the admin migration binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// `json` switches to newline-delimited JSON lines; `level` is the default
/// verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).without_time())
            .try_init()
            .ok();
    }
}

/// Default level for the `--verbose` / debug-mode switches.
pub fn level_for(verbose: bool, debug: bool) -> Level {
    if verbose || debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}
