//! Logging setup for the `rebind` binary

use tracing::Level;

/// Max level for the given verbosity
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install the global stderr subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
