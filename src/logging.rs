//! Tracing subscriber setup for binaries, demos and tests.

use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Install a stderr fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"flowtune=info"`).
///
/// Returns `Ok(false)` if a global subscriber was already installed.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `default_directive` cannot be parsed.
pub fn init_tracing(default_directive: &str) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| {
            Error::InvalidInput(format!("invalid log directive '{default_directive}': {e}"))
        })?,
    };

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok())
}
