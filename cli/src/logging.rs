use std::io;

use tracing_subscriber::EnvFilter;

/// Installs a subscriber writing log messages to stderr. `RUST_LOG` takes
/// precedence over the level derived from the flags.
pub fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
