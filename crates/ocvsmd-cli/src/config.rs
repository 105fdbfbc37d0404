//! TOML configuration file for both binaries.
//!
//! Spec: SPEC_FULL.md B.3. Loading is split into a pure `from_str` half
//! (independently testable) and a `load` half that touches the
//! filesystem.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Textual endpoint the daemon binds, parsed by `ocvsmd_address::parse`.
    pub bind: String,

    /// Log level passed to `tracing_subscriber::EnvFilter` when `RUST_LOG`
    /// is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root paths the file-server services operate over.
    #[serde(default)]
    pub file_server_roots: Vec<String>,

    /// Opaque Cyphal transport configuration, passed through verbatim to
    /// whatever `Presentation` implementation the daemon is wired with —
    /// this crate never inspects it.
    #[serde(default)]
    pub cyphal_transport: toml::Table,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config file: {e}"),
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_str(text: &str) -> Result<Config, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Config::from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let config = Config::from_str(r#"bind = "unix:/run/ocvsmd.sock""#).unwrap();
        assert_eq!(config.bind, "unix:/run/ocvsmd.sock");
        assert_eq!(config.log_level, "info");
        assert!(config.file_server_roots.is_empty());
    }

    #[test]
    fn full_config_round_trips_through_toml() {
        let text = r#"
            bind = "unix-abstract:ocvsmd"
            log_level = "debug"
            file_server_roots = ["/srv/a", "/srv/b"]

            [cyphal_transport]
            kind = "udp"
            iface = "eth0"
        "#;
        let config = Config::from_str(text).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.file_server_roots, vec!["/srv/a".to_string(), "/srv/b".to_string()]);
        assert_eq!(config.cyphal_transport.get("kind").and_then(|v| v.as_str()), Some("udp"));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(Config::from_str("bind = ").is_err());
    }
}
