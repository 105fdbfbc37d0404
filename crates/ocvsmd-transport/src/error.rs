use std::fmt;

use ocvsmd_wire::{ErrorCode, HeaderError};

/// Transport-level failure. Each variant documents how §7 ("Error handling
/// design") wants the connection/channel-set treated.
#[derive(Debug)]
pub enum TransportError {
    /// The peer closed the connection cleanly (0-byte read at header phase).
    Eof,
    /// Header failed validation: bad magic, zero size, or oversize.
    Header(HeaderError),
    /// A payload read terminated before `size` bytes arrived.
    ShortRead,
    /// The underlying socket returned an error other than would-block.
    Io(std::io::Error),
    /// `send` was called for a client id that is not currently connected.
    UnknownClient,
}

impl TransportError {
    /// Map to the wire error-code taxonomy used on `ChannelEnd`.
    pub fn as_error_code(&self) -> ErrorCode {
        match self {
            TransportError::Eof => ErrorCode::Shutdown,
            TransportError::Header(_) => ErrorCode::InvalidArgument,
            TransportError::ShortRead => ErrorCode::InvalidArgument,
            TransportError::Io(_) => ErrorCode::Shutdown,
            TransportError::UnknownClient => ErrorCode::InvalidArgument,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Eof => write!(f, "connection closed cleanly"),
            TransportError::Header(e) => write!(f, "invalid frame header: {e}"),
            TransportError::ShortRead => write!(f, "short read: payload truncated"),
            TransportError::Io(e) => write!(f, "transport I/O error: {e}"),
            TransportError::UnknownClient => write!(f, "unknown client id"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Header(e) => Some(e),
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HeaderError> for TransportError {
    fn from(e: HeaderError) -> Self {
        TransportError::Header(e)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::ShortRead
        } else {
            TransportError::Io(e)
        }
    }
}
