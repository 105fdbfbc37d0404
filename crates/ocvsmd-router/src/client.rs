//! The SDK-side channel router: allocates channels over one outbound
//! connection and multiplexes inbound route traffic back to them.
//!
//! Spec: §4.4 "Outbound channel lifecycle (client router)".

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use ocvsmd_address::Endpoint;
use ocvsmd_transport::{ClientEvent, ClientSender, StreamPipeClient, TransportError};
use ocvsmd_wire::{decode_route, encode_route, service_id, ErrorCode, ProtocolVersion, Route, PROTOCOL_VERSION};

use crate::event::{ChannelEvent, ChannelHandler};

struct ChannelSlot {
    handler: Box<dyn ChannelHandler>,
    service_id: u64,
    seq: u64,
    /// Whether `ChannelEvent::Connected` has already been delivered to
    /// `handler`. Fires once, just before the first `Input`.
    connected: bool,
}

type ChannelTable = Rc<RefCell<HashMap<u64, ChannelSlot>>>;

/// A lightweight, cloneable front for allocating channels on a connection
/// whose receive loop is driven elsewhere by [`ClientRouter::run`].
#[derive(Clone)]
pub struct ClientRouterHandle {
    channels: ChannelTable,
    sender: ClientSender,
    next_tag: Rc<Cell<u64>>,
}

impl ClientRouterHandle {
    /// Allocate a new channel bound to `service_name`. No traffic is sent
    /// until the handle's first [`ChannelHandle::send`] call.
    pub fn make_channel(&self, service_name: &str) -> ChannelHandle {
        let tag = self.next_tag.get();
        self.next_tag.set(tag + 1);

        let id = service_id(service_name);
        self.channels.borrow_mut().insert(
            tag,
            ChannelSlot {
                handler: Box::new(|_: ChannelEvent| {}),
                service_id: id,
                seq: 0,
                connected: false,
            },
        );

        ChannelHandle {
            channels: self.channels.clone(),
            sender: self.sender.clone(),
            tag,
        }
    }
}

/// Owns the connection's receive loop. Obtain a [`ClientRouterHandle`] via
/// [`ClientRouter::handle`] to allocate channels from application code
/// while [`ClientRouter::run`] drives the connection in the background.
pub struct ClientRouter {
    client: StreamPipeClient,
    handle: ClientRouterHandle,
    peer_connected: bool,
}

impl ClientRouter {
    pub async fn connect(endpoint: &Endpoint) -> std::io::Result<Self> {
        let client = StreamPipeClient::connect(endpoint).await?;
        let sender = client.sender();

        let route = Route::Connect { version: PROTOCOL_VERSION };
        if let Ok(bytes) = encode_route(&route) {
            let _ = sender.send(&[bytes.as_slice()]).await;
        }

        Ok(ClientRouter {
            client,
            handle: ClientRouterHandle {
                channels: Rc::new(RefCell::new(HashMap::new())),
                sender,
                next_tag: Rc::new(Cell::new(0)),
            },
            peer_connected: false,
        })
    }

    pub fn handle(&self) -> ClientRouterHandle {
        self.handle.clone()
    }

    /// Drive the connection until it is disconnected, completing every
    /// live channel with `ESHUTDOWN` before returning.
    pub async fn run(mut self) {
        loop {
            match self.client.recv().await {
                Some(ClientEvent::Message(bytes)) => self.handle_message(bytes),
                Some(ClientEvent::Disconnected) | None => {
                    self.complete_all(ErrorCode::ESHUTDOWN);
                    return;
                }
            }
        }
    }

    fn handle_message(&mut self, bytes: Vec<u8>) {
        let route = match decode_route(&bytes) {
            Ok(route) => route,
            Err(e) => {
                warn!(error = %e, "dropping undecodable route envelope");
                return;
            }
        };

        match route {
            Route::Connect { version } => {
                self.peer_connected = true;
                if version.major != PROTOCOL_VERSION.major {
                    warn!(?version, "protocol major version mismatch, dropping connection");
                    self.complete_all(ErrorCode::ESHUTDOWN);
                }
            }
            Route::ChannelMsg { tag, bytes, .. } => {
                if !self.peer_connected {
                    return;
                }
                let mut channels = self.handle.channels.borrow_mut();
                if let Some(slot) = channels.get_mut(&tag) {
                    if !slot.connected {
                        slot.connected = true;
                        slot.handler.on_event(ChannelEvent::Connected);
                    }
                    slot.handler.on_event(ChannelEvent::Input(bytes));
                }
            }
            Route::ChannelEnd { tag, error_code } => {
                let removed = self.handle.channels.borrow_mut().remove(&tag);
                if let Some(mut slot) = removed {
                    if !slot.connected {
                        slot.handler.on_event(ChannelEvent::Connected);
                    }
                    slot.handler.on_event(ChannelEvent::Completed(error_code));
                }
            }
        }
    }

    fn complete_all(&mut self, error_code: i32) {
        let mut tags: Vec<u64> = self.handle.channels.borrow().keys().copied().collect();
        tags.sort_unstable();
        for tag in tags {
            if let Some(mut slot) = self.handle.channels.borrow_mut().remove(&tag) {
                if !slot.connected {
                    slot.handler.on_event(ChannelEvent::Connected);
                }
                slot.handler.on_event(ChannelEvent::Completed(error_code));
            }
        }
    }
}

/// A single outbound channel. The first [`send`](ChannelHandle::send)
/// implicitly opens the channel on the wire.
pub struct ChannelHandle {
    channels: ChannelTable,
    sender: ClientSender,
    tag: u64,
}

impl ChannelHandle {
    pub fn subscribe(&self, handler: impl ChannelHandler + 'static) {
        if let Some(slot) = self.channels.borrow_mut().get_mut(&self.tag) {
            slot.handler = Box::new(handler);
        }
    }

    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let route_bytes = {
            let mut channels = self.channels.borrow_mut();
            let Some(slot) = channels.get_mut(&self.tag) else {
                return Ok(());
            };
            let sequence = slot.seq;
            slot.seq += 1;
            let route = Route::ChannelMsg {
                tag: self.tag,
                sequence,
                service_id: slot.service_id,
                bytes,
            };
            encode_route(&route).map_err(|_| TransportError::UnknownClient)?
        };
        self.sender.send(&[route_bytes.as_slice()]).await
    }

    /// Complete the channel locally. A no-op if the peer already
    /// completed it (the table entry would already be gone).
    pub async fn complete(&self, error_code: i32) {
        let removed = self.channels.borrow_mut().remove(&self.tag);
        if removed.is_none() {
            return;
        }
        let route = Route::ChannelEnd { tag: self.tag, error_code };
        if let Ok(bytes) = encode_route(&route) {
            let _ = self.sender.send(&[bytes.as_slice()]).await;
        }
    }
}
