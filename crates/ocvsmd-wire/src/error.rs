//! POSIX errno-like taxonomy carried on `ChannelEnd.error_code`.
//!
//! Spec: data model §3 "Result envelope", §6 "Error-code taxonomy".

use std::fmt;

/// Wire-level completion code for a channel.
///
/// `Success` is the only code that does not terminate the channel with a
/// failure; every other variant maps to a POSIX errno used purely for its
/// recognizable numeric value, not for interop with the host libc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    NoMemory,
    InvalidArgument,
    AlreadyExists,
    TimedOut,
    Busy,
    NotConnected,
    Shutdown,
    Canceled,
    NotSupported,
    /// Passthrough of a platform error code not covered above.
    Other(i32),
}

impl ErrorCode {
    pub const ENOMEM: i32 = 12;
    pub const EINVAL: i32 = 22;
    pub const EEXIST: i32 = 17;
    pub const ETIMEDOUT: i32 = 110;
    pub const EBUSY: i32 = 16;
    pub const ENOTCONN: i32 = 107;
    pub const ESHUTDOWN: i32 = 108;
    pub const ECANCELED: i32 = 125;
    pub const ENOSYS: i32 = 38;

    pub fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl From<i32> for ErrorCode {
    fn from(value: i32) -> Self {
        match value {
            0 => ErrorCode::Success,
            Self::ENOMEM => ErrorCode::NoMemory,
            Self::EINVAL => ErrorCode::InvalidArgument,
            Self::EEXIST => ErrorCode::AlreadyExists,
            Self::ETIMEDOUT => ErrorCode::TimedOut,
            Self::EBUSY => ErrorCode::Busy,
            Self::ENOTCONN => ErrorCode::NotConnected,
            Self::ESHUTDOWN => ErrorCode::Shutdown,
            Self::ECANCELED => ErrorCode::Canceled,
            Self::ENOSYS => ErrorCode::NotSupported,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> i32 {
        match code {
            ErrorCode::Success => 0,
            ErrorCode::NoMemory => ErrorCode::ENOMEM,
            ErrorCode::InvalidArgument => ErrorCode::EINVAL,
            ErrorCode::AlreadyExists => ErrorCode::EEXIST,
            ErrorCode::TimedOut => ErrorCode::ETIMEDOUT,
            ErrorCode::Busy => ErrorCode::EBUSY,
            ErrorCode::NotConnected => ErrorCode::ENOTCONN,
            ErrorCode::Shutdown => ErrorCode::ESHUTDOWN,
            ErrorCode::Canceled => ErrorCode::ECANCELED,
            ErrorCode::NotSupported => ErrorCode::ENOSYS,
            ErrorCode::Other(v) => v,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Success => "success",
            ErrorCode::NoMemory => "out of memory",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::AlreadyExists => "already exists",
            ErrorCode::TimedOut => "timed out",
            ErrorCode::Busy => "too many pending",
            ErrorCode::NotConnected => "not connected",
            ErrorCode::Shutdown => "shutdown",
            ErrorCode::Canceled => "canceled",
            ErrorCode::NotSupported => "not supported",
            ErrorCode::Other(v) => return write!(f, "platform error {v}"),
        };
        write!(f, "{name} ({})", i32::from(*self))
    }
}

impl std::error::Error for ErrorCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_known_codes() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::NoMemory,
            ErrorCode::InvalidArgument,
            ErrorCode::AlreadyExists,
            ErrorCode::TimedOut,
            ErrorCode::Busy,
            ErrorCode::NotConnected,
            ErrorCode::Shutdown,
            ErrorCode::Canceled,
            ErrorCode::NotSupported,
        ];
        for code in codes {
            let raw: i32 = code.into();
            assert_eq!(ErrorCode::from(raw), code);
        }
    }

    #[test]
    fn unknown_code_passes_through() {
        assert_eq!(ErrorCode::from(42), ErrorCode::Other(42));
        assert_eq!(i32::from(ErrorCode::Other(42)), 42);
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(i32::from(ErrorCode::Success), 0);
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::TimedOut.is_success());
    }
}
