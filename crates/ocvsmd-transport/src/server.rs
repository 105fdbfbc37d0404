//! The daemon side of a stream pipe: one listener, many concurrently
//! connected clients.
//!
//! Spec: §4.3 "Stream pipe server". Client ids are monotonically
//! increasing and never reused for the lifetime of the server, so a late
//! event referencing a since-disconnected id is unambiguous to the
//! caller.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, warn};

use ocvsmd_address::Endpoint;

use crate::error::TransportError;
use crate::framing::{recv_frame, send_frame};
use crate::listener::Listener;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub(crate) u64);

#[derive(Debug)]
pub enum PipeEvent {
    Connected(ClientId),
    Message(ClientId, Vec<u8>),
    Disconnected(ClientId),
}

/// `send_frame` writes a header then every fragment as separate `write_all`
/// calls, so two channels on the same connection calling `Gateway::send`
/// concurrently must still not interleave their bytes on the wire. This is
/// the one spot in the crate that keeps an async mutex rather than a
/// `RefCell`: the table of writers below is plain single-thread-owned state
/// (`Rc<RefCell<>>`, never touched across an `.await`), but the writer
/// itself is held across the multi-`.await` body of `send_frame`, which a
/// `RefCell` can't do without panicking on the second concurrent borrow.
type Writer = Rc<AsyncMutex<Box<dyn AsyncWrite + Unpin>>>;

/// A cheaply-cloneable handle for sending to clients of a
/// [`StreamPipeServer`], independent of the server's receive side. Callers
/// that need to send from a different task/closure than the one draining
/// `recv()` should hold this instead of the server itself.
#[derive(Clone)]
pub struct ServerSender {
    writers: Rc<RefCell<HashMap<ClientId, Writer>>>,
}

impl ServerSender {
    /// Send one frame to a specific connected client. Returns
    /// [`TransportError::UnknownClient`] if the client has already
    /// disconnected (a benign race with the accept/read loop).
    pub async fn send(&self, client_id: ClientId, fragments: &[&[u8]]) -> Result<(), TransportError> {
        let writer = self
            .writers
            .borrow()
            .get(&client_id)
            .cloned()
            .ok_or(TransportError::UnknownClient)?;

        let mut writer = writer.lock().await;
        send_frame(&mut *writer, fragments).await
    }

    /// Shut down and forget the write half for a client, forcing its
    /// read loop to observe EOF and emit [`PipeEvent::Disconnected`]. A
    /// no-op if the client is already gone.
    pub async fn disconnect(&self, client_id: ClientId) {
        let writer = self.writers.borrow_mut().remove(&client_id);
        if let Some(writer) = writer {
            let mut writer = writer.lock().await;
            let _ = writer.shutdown().await;
        }
    }
}

/// A cloneable handle that requests the listener stop accepting new
/// connections. Already-accepted clients are unaffected — their read
/// loops keep running and still feed `recv()` until they disconnect on
/// their own, which is what lets a caller drain in-flight work instead
/// of severing every connection at once.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn request(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct StreamPipeServer {
    events: mpsc::UnboundedReceiver<PipeEvent>,
    writers: Rc<RefCell<HashMap<ClientId, Writer>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl StreamPipeServer {
    pub async fn bind(endpoint: &Endpoint) -> std::io::Result<Self> {
        let listener = Listener::bind(endpoint).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writers = Rc::new(RefCell::new(HashMap::new()));
        let next_id = Rc::new(Cell::new(1u64));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::task::spawn_local(accept_loop(listener, tx, writers.clone(), next_id, shutdown_rx));

        Ok(StreamPipeServer { events: rx, writers, shutdown_tx })
    }

    /// A cloneable sender that can outlive and be used independently of
    /// this server's `recv()` loop.
    pub fn sender(&self) -> ServerSender {
        ServerSender {
            writers: self.writers.clone(),
        }
    }

    /// A cloneable handle for requesting a graceful stop-accepting from a
    /// task other than the one driving `recv()`.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal { tx: self.shutdown_tx.clone() }
    }

    /// Send one frame to a specific connected client. Returns
    /// [`TransportError::UnknownClient`] if the client has already
    /// disconnected (a benign race with the accept/read loop).
    pub async fn send(&self, client_id: ClientId, fragments: &[&[u8]]) -> Result<(), TransportError> {
        self.sender().send(client_id, fragments).await
    }

    /// Forcibly close a client's connection. See [`ServerSender::disconnect`].
    pub async fn disconnect(&self, client_id: ClientId) {
        self.sender().disconnect(client_id).await
    }

    pub async fn recv(&mut self) -> Option<PipeEvent> {
        self.events.recv().await
    }
}

async fn accept_loop(
    listener: Listener,
    tx: mpsc::UnboundedSender<PipeEvent>,
    writers: Rc<RefCell<HashMap<ClientId, Writer>>>,
    next_id: Rc<Cell<u64>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let accept = async {
            match &listener {
                Listener::Tcp(l) => l.accept().await.map(|(s, _)| {
                    let (r, w): (
                        Box<dyn tokio::io::AsyncRead + Unpin>,
                        Box<dyn AsyncWrite + Unpin>,
                    ) = {
                        let _ = s.set_nodelay(true);
                        let (r, w) = tokio::io::split(s);
                        (Box::new(r), Box::new(w))
                    };
                    (r, w)
                }),
                Listener::Unix(l) => l.accept().await.map(|(s, _)| {
                    let (r, w) = tokio::io::split(s);
                    let r: Box<dyn tokio::io::AsyncRead + Unpin> = Box::new(r);
                    let w: Box<dyn AsyncWrite + Unpin> = Box::new(w);
                    (r, w)
                }),
            }
        };

        let accepted = tokio::select! {
            accepted = accept => accepted,
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
                continue;
            }
        };

        let (reader, writer) = match accepted {
            Ok(pair) => pair,
            Err(_) => return,
        };

        let client_id = ClientId(next_id.get());
        next_id.set(next_id.get() + 1);
        writers.borrow_mut().insert(client_id, Rc::new(AsyncMutex::new(writer)));

        if tx.send(PipeEvent::Connected(client_id)).is_err() {
            return;
        }

        tokio::task::spawn_local(read_loop(client_id, reader, tx.clone(), writers.clone()));
    }
}

async fn read_loop(
    client_id: ClientId,
    mut reader: Box<dyn tokio::io::AsyncRead + Unpin>,
    tx: mpsc::UnboundedSender<PipeEvent>,
    writers: Rc<RefCell<HashMap<ClientId, Writer>>>,
) {
    loop {
        match recv_frame(&mut reader).await {
            Ok(Some(payload)) => {
                if tx.send(PipeEvent::Message(client_id, payload.to_vec())).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!(?client_id, "client closed its write half");
                break;
            }
            Err(e) => {
                warn!(?client_id, error = %e, "closing connection after transport error");
                break;
            }
        }
    }
    writers.borrow_mut().remove(&client_id);
    let _ = tx.send(PipeEvent::Disconnected(client_id));
}
