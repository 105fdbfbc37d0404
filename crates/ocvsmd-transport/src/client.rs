//! The SDK side of a stream pipe: one outbound connection, reconnect left
//! to the caller.
//!
//! Spec: §4.3 "Stream pipe client". Connection establishment is async and
//! non-blocking end to end (`TcpStream::connect`/`UnixStream::connect`
//! already suspend on `EINPROGRESS` the way the spec's "arm a writable
//! callback, then inspect `SO_ERROR`" dance does by hand), so there is no
//! separate connecting/connected state here.

#[cfg(target_os = "linux")]
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr as UnixSocketAddr, UnixStream as StdUnixStream};
use std::rc::Rc;

use tokio::io::AsyncWrite;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use ocvsmd_address::Endpoint;

use crate::error::TransportError;
use crate::framing::{recv_frame, send_frame};

/// Events the client's background reader hands back to the caller.
#[derive(Debug)]
pub enum ClientEvent {
    Message(Vec<u8>),
    Disconnected,
}

/// A cheaply-cloneable handle for sending on a [`StreamPipeClient`],
/// independent of the client's receive side. Kept behind an async mutex
/// rather than a `RefCell` for the same reason as the server's `Writer`:
/// `send_frame`'s body spans several `.await` points that two concurrently
/// sending channels must not interleave.
#[derive(Clone)]
pub struct ClientSender {
    writer: Rc<AsyncMutex<Box<dyn AsyncWrite + Unpin>>>,
}

impl ClientSender {
    pub async fn send(&self, fragments: &[&[u8]]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        send_frame(&mut *writer, fragments).await
    }
}

pub struct StreamPipeClient {
    writer: Rc<AsyncMutex<Box<dyn AsyncWrite + Unpin>>>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl StreamPipeClient {
    pub async fn connect(endpoint: &Endpoint) -> std::io::Result<Self> {
        let (reader, writer): (
            Box<dyn tokio::io::AsyncRead + Unpin>,
            Box<dyn AsyncWrite + Unpin>,
        ) = match endpoint {
            Endpoint::UnixPath(path) => {
                let stream = UnixStream::connect(path).await?;
                let (r, w) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            Endpoint::UnixAbstract(name) => {
                let std_stream = connect_unix_abstract(name)?;
                std_stream.set_nonblocking(true)?;
                let stream = UnixStream::from_std(std_stream)?;
                let (r, w) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            Endpoint::Ipv4 { addr, port } => {
                let stream = TcpStream::connect((*addr, *port)).await?;
                stream.set_nodelay(true)?;
                let (r, w) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            Endpoint::Ipv6 { addr, port } => {
                let stream = TcpStream::connect((*addr, *port)).await?;
                stream.set_nodelay(true)?;
                let (r, w) = tokio::io::split(stream);
                (Box::new(r), Box::new(w))
            }
            Endpoint::Wildcard { .. } => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "a wildcard endpoint cannot be used as a connect target",
                ));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(read_loop(reader, tx));

        Ok(StreamPipeClient {
            writer: Rc::new(AsyncMutex::new(writer)),
            events: rx,
        })
    }

    /// A cloneable sender that can outlive and be used independently of
    /// this client's `recv()` loop.
    pub fn sender(&self) -> ClientSender {
        ClientSender {
            writer: self.writer.clone(),
        }
    }

    /// Send one frame made of `fragments` concatenated in wire order.
    pub async fn send(&self, fragments: &[&[u8]]) -> Result<(), TransportError> {
        self.sender().send(fragments).await
    }

    /// Wait for the next event. `None` once the reader task has exited
    /// and every event has been drained.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }
}

#[cfg(target_os = "linux")]
fn connect_unix_abstract(name: &[u8]) -> std::io::Result<StdUnixStream> {
    let addr = UnixSocketAddr::from_abstract_name(name)?;
    StdUnixStream::connect_addr(&addr)
}

#[cfg(not(target_os = "linux"))]
fn connect_unix_abstract(_name: &[u8]) -> std::io::Result<StdUnixStream> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "abstract-namespace unix sockets are Linux-only",
    ))
}

async fn read_loop(
    mut reader: Box<dyn tokio::io::AsyncRead + Unpin>,
    tx: mpsc::UnboundedSender<ClientEvent>,
) {
    loop {
        match recv_frame(&mut reader).await {
            Ok(Some(payload)) => {
                if tx.send(ClientEvent::Message(payload.to_vec())).is_err() {
                    return;
                }
            }
            Ok(None) => {
                debug!("server closed its write half");
                let _ = tx.send(ClientEvent::Disconnected);
                return;
            }
            Err(e) => {
                warn!(error = %e, "closing connection after transport error");
                let _ = tx.send(ClientEvent::Disconnected);
                return;
            }
        }
    }
}
