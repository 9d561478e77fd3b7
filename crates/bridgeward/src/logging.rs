//! Process-wide log setup.

use tracing_subscriber::EnvFilter;

use crate::BridgeError;

/// Installs a `tracing` subscriber that writes to stderr.
///
/// The filter comes from `RUST_LOG` when it is set, then from `filter`,
/// then defaults to `info`.
///
/// # Errors
/// [`BridgeError::Config`] for an unparsable filter, or when a global
/// subscriber is already installed.
pub fn init(filter: Option<&str>) -> Result<(), BridgeError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => EnvFilter::try_new(filter.unwrap_or("info"))
            .map_err(|e| BridgeError::Config(format!("invalid log filter: {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("logging already initialized: {e}")))
}
