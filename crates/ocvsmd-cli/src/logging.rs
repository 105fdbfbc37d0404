//! Global `tracing` subscriber installation, shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Install a global subscriber driven by `RUST_LOG`, falling back to
/// `default_level` (a config-file log level) when unset.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
