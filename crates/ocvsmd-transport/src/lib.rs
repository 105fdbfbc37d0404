//! Non-blocking stream-socket transport: length-prefixed framing over
//! UNIX-domain and TCP sockets, with a listening server side that fans
//! in many clients and a connecting client side for SDK use.

mod client;
mod error;
mod framing;
mod listener;
mod payload;
mod server;

pub use client::{ClientEvent, ClientSender, StreamPipeClient};
pub use error::TransportError;
pub use framing::{recv_frame, send_frame};
pub use listener::Listener;
pub use payload::{Payload, INLINE_PAYLOAD_MAX};
pub use server::{ClientId, PipeEvent, ServerSender, ShutdownSignal, StreamPipeServer};
