//! The daemon-side service dispatch layer: one FSM per inbound channel,
//! registered against [`ocvsmd_router::ServiceRegistry`] by service name.
//!
//! Spec: §4.6 "Service dispatch (daemon side)". The Execute-Command
//! service is the canonical fan-out FSM; every other standardized service
//! adapts the same skeleton ([`fanout::run_fan_out`] for the ones that
//! talk to remote nodes, plain local state for the ones that don't).

mod fanout;

pub mod execute_command;
pub mod file_server;
pub mod monitor;
pub mod pnp;
pub mod registers;

pub use execute_command::ExecuteCommandService;
pub use registers::{RegisterAccessService, RegisterListService};
