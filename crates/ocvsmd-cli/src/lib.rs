//! Shared plumbing for the `ocvsmd` daemon binary and the `ocvsmdcli`
//! client binary: config loading, logging, daemonization. Deliberately
//! free of protocol logic — everything here is argument parsing and
//! process-lifecycle wiring.

pub mod config;
pub mod daemonize;
pub mod logging;

pub use config::{Config, ConfigError};
pub use daemonize::{daemonize, DaemonizeError};
