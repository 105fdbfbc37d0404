//! Binding an [`Endpoint`] to a listening socket.
//!
//! Spec: §4.1 ("one socket family per endpoint form"), §4.3 ("dual-stack
//! wildcard binds with `IPV6_V6ONLY` disabled"). Plain IPv4/IPv6 addresses
//! go through `socket2` too so every TCP path shares one code path down to
//! `listen()`.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
#[cfg(target_os = "linux")]
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr as UnixSocketAddr, UnixListener as StdUnixListener};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, UnixListener};

use ocvsmd_address::Endpoint;

/// Number of pending connections the kernel queues before `accept` drains
/// them; the daemon expects at most a handful of concurrent SDK clients.
const LISTEN_BACKLOG: i32 = 5;

pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Listener> {
        match endpoint {
            Endpoint::UnixPath(path) => {
                let _ = std::fs::remove_file(path);
                let std_listener = StdUnixListener::bind(path)?;
                std_listener.set_nonblocking(true)?;
                Ok(Listener::Unix(UnixListener::from_std(std_listener)?))
            }
            Endpoint::UnixAbstract(name) => {
                let std_listener = bind_unix_abstract(name)?;
                std_listener.set_nonblocking(true)?;
                Ok(Listener::Unix(UnixListener::from_std(std_listener)?))
            }
            Endpoint::Ipv4 { addr, port } => {
                let socket = bind_tcp(Domain::IPV4, SocketAddr::V4(SocketAddrV4::new(*addr, *port)), false)?;
                Ok(Listener::Tcp(TcpListener::from_std(socket.into())?))
            }
            Endpoint::Ipv6 { addr, port } => {
                let socket = bind_tcp(
                    Domain::IPV6,
                    SocketAddr::V6(SocketAddrV6::new(*addr, *port, 0, 0)),
                    false,
                )?;
                Ok(Listener::Tcp(TcpListener::from_std(socket.into())?))
            }
            Endpoint::Wildcard { port } => {
                let socket = bind_tcp(
                    Domain::IPV6,
                    SocketAddr::V6(SocketAddrV6::new(std::net::Ipv6Addr::UNSPECIFIED, *port, 0, 0)),
                    true,
                )?;
                Ok(Listener::Tcp(TcpListener::from_std(socket.into())?))
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn bind_unix_abstract(name: &[u8]) -> io::Result<StdUnixListener> {
    let addr = UnixSocketAddr::from_abstract_name(name)?;
    StdUnixListener::bind_addr(&addr)
}

#[cfg(not(target_os = "linux"))]
fn bind_unix_abstract(_name: &[u8]) -> io::Result<StdUnixListener> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract-namespace unix sockets are Linux-only",
    ))
}

fn bind_tcp(domain: Domain, addr: SocketAddr, v6_only_off: bool) -> io::Result<Socket> {
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if v6_only_off {
        socket.set_only_v6(false)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}
