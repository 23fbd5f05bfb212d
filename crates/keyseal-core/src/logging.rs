//! Logging setup shared by keyseal binaries.

use env_logger::{Builder, Env};

/// Initialize the process-wide logger, honouring `RUST_LOG` with
/// `default_level` as the fallback filter. Safe to call more than once; later
/// calls are no-ops.
pub fn init(default_level: &str) {
    let _ = Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .try_init();
}
