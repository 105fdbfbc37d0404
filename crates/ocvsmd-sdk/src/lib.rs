//! Client-side service adapters over the channel router.
//!
//! Each adapter turns a request into a submitted channel plus a
//! [`sender::Sender`] that resolves once the daemon completes the
//! channel, using one of the three accumulation patterns from
//! [`sender`]: list-style, map-style, or unit-style.

pub mod execute_command;
pub mod file_server;
pub mod monitor;
pub mod registers;
pub mod sender;

pub use execute_command::{execute_command, ExecuteCommandRequest, ExecuteCommandResponse};
pub use file_server::{list_roots, pop_root, push_root};
pub use monitor::{snapshot, NodeSnapshot};
pub use registers::{register_list, register_read, register_write, RegisterValue};
pub use sender::{run_blocking, Outcome, Sender};
