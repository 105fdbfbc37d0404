//! Wire-level types shared by client and server: frame header, the Route
//! envelope tagged union, the service-id hash, and the error-code taxonomy.
//!
//! This crate has no I/O; it is pure encode/decode and validation, kept
//! separate so both `ocvsmd-transport` and `ocvsmd-sdk`/`ocvsmd-daemon` can
//! depend on it without pulling in tokio.

mod error;
mod frame;
mod route;
mod service_id;

pub use error::ErrorCode;
pub use frame::{FrameHeader, HeaderError, FRAME_MAGIC, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use route::{decode_route, encode_route, ProtocolVersion, Route, RouteCodecError, PROTOCOL_VERSION};
pub use service_id::service_id;
