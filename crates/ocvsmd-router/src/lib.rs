//! Route-protocol channel multiplexing: the client and server halves of
//! the channel router, plus the service factory registry the server side
//! dispatches into.

mod client;
mod event;
mod gateway;
mod registry;
mod server;

pub use client::{ChannelHandle, ClientRouter, ClientRouterHandle};
pub use event::{ChannelEvent, ChannelHandler};
pub use gateway::Gateway;
pub use registry::{ServiceFactory, ServiceRegistry};
pub use ocvsmd_transport::ShutdownSignal;
pub use server::ServerRouter;
