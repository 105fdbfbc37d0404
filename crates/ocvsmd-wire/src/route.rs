//! The Route envelope: the tagged union carried as every frame's payload.
//!
//! Spec: data model §3 "Route envelope", external interfaces §6.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::frame::MAX_PAYLOAD_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

/// The wire protocol version this crate implements.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Connect {
        version: ProtocolVersion,
    },
    ChannelMsg {
        tag: u64,
        sequence: u64,
        service_id: u64,
        bytes: Vec<u8>,
    },
    ChannelEnd {
        tag: u64,
        error_code: i32,
    },
}

impl Route {
    pub fn tag(&self) -> Option<u64> {
        match self {
            Route::Connect { .. } => None,
            Route::ChannelMsg { tag, .. } => Some(*tag),
            Route::ChannelEnd { tag, .. } => Some(*tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCodecError {
    Encode,
    Decode,
    TooLarge(usize),
}

impl fmt::Display for RouteCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteCodecError::Encode => write!(f, "failed to encode route envelope"),
            RouteCodecError::Decode => write!(f, "failed to decode route envelope"),
            RouteCodecError::TooLarge(len) => {
                write!(f, "encoded route envelope ({len} bytes) exceeds max {MAX_PAYLOAD_LEN}")
            }
        }
    }
}

impl std::error::Error for RouteCodecError {}

/// Serialize a [`Route`] to bytes, enforcing the frame size bound.
pub fn encode_route(route: &Route) -> Result<Vec<u8>, RouteCodecError> {
    let bytes = postcard::to_allocvec(route).map_err(|_| RouteCodecError::Encode)?;
    if bytes.len() as u64 > MAX_PAYLOAD_LEN as u64 {
        return Err(RouteCodecError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Deserialize a [`Route`] from a complete frame payload.
pub fn decode_route(bytes: &[u8]) -> Result<Route, RouteCodecError> {
    postcard::from_bytes(bytes).map_err(|_| RouteCodecError::Decode)
}
