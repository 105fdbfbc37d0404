//! Endpoint address parsing.
//!
//! Spec: §4.1 "Address parser". Parses a single textual endpoint into a
//! bindable/connectable [`Endpoint`]. No DNS resolution is ever performed.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Maximum usable length of `sockaddr_un.sun_path` on Linux, including the
/// terminating NUL for filesystem-path sockets.
pub const MAX_UNIX_PATH_LEN: usize = 108;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `unix:<path>` — a filesystem-path UNIX domain socket.
    UnixPath(String),
    /// `unix-abstract:<path>` — an abstract-namespace UNIX domain socket.
    /// The leading NUL is implicit; `path` is the raw byte sequence that
    /// follows it, NUL bytes included verbatim.
    UnixAbstract(Vec<u8>),
    /// Bare or bracketed IPv6, with port.
    Ipv6 { addr: Ipv6Addr, port: u16 },
    /// `ipv4:port`.
    Ipv4 { addr: Ipv4Addr, port: u16 },
    /// `*` or `*:port` — dual-stack wildcard, to be bound with
    /// `IPV6_V6ONLY` disabled.
    Wildcard { port: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Maps to EINVAL: malformed textual address.
    InvalidArgument(String),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for AddressError {}

fn invalid(msg: impl Into<String>) -> AddressError {
    AddressError::InvalidArgument(msg.into())
}

/// Parse a single endpoint string, trying the recognized forms in order.
///
/// `default_port` is used for forms that carry no explicit port (bare IPv4,
/// bare wildcard).
pub fn parse(s: &str, default_port: u16) -> Result<Endpoint, AddressError> {
    if let Some(path) = s.strip_prefix("unix:") {
        return parse_unix_path(path);
    }
    if let Some(path) = s.strip_prefix("unix-abstract:") {
        return parse_unix_abstract(path);
    }
    if let Some(rest) = s.strip_prefix('[') {
        return parse_bracketed_ipv6(rest);
    }
    if s == "*" {
        return Ok(Endpoint::Wildcard { port: default_port });
    }
    if let Some(port_str) = s.strip_prefix("*:") {
        let port = parse_port(port_str)?;
        return Ok(Endpoint::Wildcard { port });
    }
    let colon_count = s.matches(':').count();
    if colon_count >= 2 {
        let addr: Ipv6Addr = s
            .parse()
            .map_err(|_| invalid(format!("not a valid bare IPv6 address: {s}")))?;
        return Ok(Endpoint::Ipv6 {
            addr,
            port: default_port,
        });
    }
    if colon_count == 1 {
        let (host, port_str) = s.split_once(':').unwrap();
        let port = parse_port(port_str)?;
        let addr: Ipv4Addr = host
            .parse()
            .map_err(|_| invalid(format!("not a valid IPv4 address: {host}")))?;
        return Ok(Endpoint::Ipv4 {
            addr,
            port,
        });
    }
    // No ':' at all: bare IPv4 (or '*' already handled above) at default port.
    let addr: Ipv4Addr = s
        .parse()
        .map_err(|_| invalid(format!("not a valid IPv4 address: {s}")))?;
    Ok(Endpoint::Ipv4 {
        addr,
        port: default_port,
    })
}

fn parse_port(s: &str) -> Result<u16, AddressError> {
    s.parse::<u16>()
        .map_err(|_| invalid(format!("not a valid port (0-65535): {s}")))
}

fn parse_unix_path(path: &str) -> Result<Endpoint, AddressError> {
    if path.len() + 1 > MAX_UNIX_PATH_LEN {
        return Err(invalid(format!(
            "unix socket path too long: {} bytes (including terminator, max {})",
            path.len() + 1,
            MAX_UNIX_PATH_LEN
        )));
    }
    Ok(Endpoint::UnixPath(path.to_string()))
}

fn parse_unix_abstract(path: &str) -> Result<Endpoint, AddressError> {
    let bytes = path.as_bytes().to_vec();
    if bytes.len() + 1 > MAX_UNIX_PATH_LEN {
        return Err(invalid(format!(
            "abstract socket path too long: {} bytes (including leading NUL, max {})",
            bytes.len() + 1,
            MAX_UNIX_PATH_LEN
        )));
    }
    Ok(Endpoint::UnixAbstract(bytes))
}

fn parse_bracketed_ipv6(rest: &str) -> Result<Endpoint, AddressError> {
    let close = rest
        .find(']')
        .ok_or_else(|| invalid("unclosed '[' in bracketed IPv6 address"))?;
    let (addr_str, tail) = rest.split_at(close);
    let addr: Ipv6Addr = addr_str
        .parse()
        .map_err(|_| invalid(format!("not a valid IPv6 address: {addr_str}")))?;
    let tail = &tail[1..]; // drop ']'
    if tail.is_empty() {
        return Err(invalid("missing ':' between ']' and port"));
    }
    let port_str = tail
        .strip_prefix(':')
        .ok_or_else(|| invalid("missing ':' between ']' and port"))?;
    let port = parse_port(port_str)?;
    Ok(Endpoint::Ipv6 { addr, port })
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::UnixPath(path) => write!(f, "unix:{path}"),
            Endpoint::UnixAbstract(bytes) => {
                write!(f, "unix-abstract:{}", String::from_utf8_lossy(bytes))
            }
            Endpoint::Ipv6 { addr, port } => write!(f, "[{addr}]:{port}"),
            Endpoint::Ipv4 { addr, port } => write!(f, "{addr}:{port}"),
            Endpoint::Wildcard { port } => write!(f, "*:{port}"),
        }
    }
}
