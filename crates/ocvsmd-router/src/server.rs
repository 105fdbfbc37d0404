//! The daemon-side channel router: binds inbound channels to registered
//! service factories and multiplexes many clients over one listener.
//!
//! Spec: §4.4 "Inbound channel lifecycle (server router)".

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use ocvsmd_address::Endpoint;
use ocvsmd_transport::{ClientId, PipeEvent, ShutdownSignal, StreamPipeServer};
use ocvsmd_wire::{decode_route, encode_route, ErrorCode, ProtocolVersion, Route, PROTOCOL_VERSION};

use crate::event::{ChannelEvent, ChannelHandler};
use crate::gateway::{ChannelSlot, ChannelTable, Gateway};
use crate::registry::ServiceRegistry;

#[derive(Default)]
struct ConnectionState {
    peer_version: Option<ProtocolVersion>,
    /// `min(local.minor, peer.minor)` once the handshake completes;
    /// nothing reads this yet, but it's recorded the way the upstream
    /// daemon's handshake carries it for future feature-gating.
    negotiated_minor: Option<u8>,
    /// Tags that have seen `ChannelEnd` on this connection. A tag never
    /// leaves this set for the connection's lifetime, so a late
    /// `ChannelMsg` referencing it is rejected rather than reopened
    /// against a fresh factory lookup.
    completed_tags: std::collections::HashSet<u64>,
}

pub struct ServerRouter {
    server: StreamPipeServer,
    registry: ServiceRegistry,
    channels: ChannelTable,
    connections: HashMap<ClientId, ConnectionState>,
}

impl ServerRouter {
    pub async fn bind(endpoint: &Endpoint, registry: ServiceRegistry) -> std::io::Result<Self> {
        let server = StreamPipeServer::bind(endpoint).await?;
        Ok(ServerRouter {
            server,
            registry,
            channels: Rc::new(RefCell::new(HashMap::new())),
            connections: HashMap::new(),
        })
    }

    /// A cloneable handle for requesting that the listener stop accepting
    /// new connections, without interrupting channels already in flight.
    /// Grab this before handing the router to [`ServerRouter::run`], since
    /// `run` consumes `self`.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.server.shutdown_signal()
    }

    /// Drive the router until the listener's event stream ends. In
    /// practice that happens one of two ways: the accept loop died (e.g.
    /// the listening socket was closed out from under it), or
    /// [`ServerRouter::shutdown_signal`] was used to stop accepting new
    /// connections and every already-connected client has since
    /// disconnected on its own, draining all in-flight channels.
    pub async fn run(mut self) {
        while let Some(event) = self.server.recv().await {
            self.handle_event(event).await;
        }
    }

    async fn handle_event(&mut self, event: PipeEvent) {
        match event {
            PipeEvent::Connected(client_id) => {
                self.connections.insert(client_id, ConnectionState::default());
                self.send_connect(client_id).await;
            }
            PipeEvent::Message(client_id, bytes) => self.handle_message(client_id, bytes).await,
            PipeEvent::Disconnected(client_id) => self.handle_disconnect(client_id),
        }
    }

    async fn send_connect(&self, client_id: ClientId) {
        let route = Route::Connect { version: PROTOCOL_VERSION };
        if let Ok(bytes) = encode_route(&route) {
            let _ = self.server.send(client_id, &[bytes.as_slice()]).await;
        }
    }

    async fn handle_message(&mut self, client_id: ClientId, bytes: Vec<u8>) {
        let route = match decode_route(&bytes) {
            Ok(route) => route,
            Err(e) => {
                warn!(?client_id, error = %e, "dropping undecodable route envelope");
                return;
            }
        };

        match route {
            Route::Connect { version } => self.handle_connect(client_id, version).await,
            Route::ChannelMsg { tag, sequence, service_id, bytes } => {
                self.handle_channel_msg(client_id, tag, sequence, service_id, bytes).await
            }
            Route::ChannelEnd { tag, error_code } => self.handle_channel_end(client_id, tag, error_code),
        }
    }

    async fn handle_connect(&mut self, client_id: ClientId, version: ProtocolVersion) {
        let Some(state) = self.connections.get_mut(&client_id) else {
            return;
        };
        state.peer_version = Some(version);
        state.negotiated_minor = Some(version.minor.min(PROTOCOL_VERSION.minor));

        if version.major != PROTOCOL_VERSION.major {
            warn!(?client_id, ?version, "protocol major version mismatch, dropping connection");
            self.complete_connection(client_id, ErrorCode::ESHUTDOWN);
            self.connections.remove(&client_id);
            self.server.disconnect(client_id).await;
        }
    }

    async fn handle_channel_msg(
        &mut self,
        client_id: ClientId,
        tag: u64,
        _sequence: u64,
        service_id: u64,
        bytes: Vec<u8>,
    ) {
        let handshake_done = self
            .connections
            .get(&client_id)
            .map(|c| c.peer_version.is_some())
            .unwrap_or(false);
        if !handshake_done {
            debug!(?client_id, tag, "dropping channel message before handshake completed");
            return;
        }

        let already_completed = self
            .connections
            .get(&client_id)
            .map(|c| c.completed_tags.contains(&tag))
            .unwrap_or(false);
        if already_completed {
            warn!(?client_id, tag, "dropping channel message for a tag already completed");
            return;
        }

        let already_open = self.channels.borrow().contains_key(&(client_id, tag));
        if !already_open {
            let Some(factory) = self.registry.lookup(service_id) else {
                let route = Route::ChannelEnd { tag, error_code: ErrorCode::ENOSYS };
                if let Ok(end_bytes) = encode_route(&route) {
                    let _ = self.server.send(client_id, &[end_bytes.as_slice()]).await;
                }
                return;
            };

            let gateway = Gateway {
                sender: self.server.sender(),
                channels: self.channels.clone(),
                client_id,
                tag,
            };
            let handler = factory(gateway);
            self.channels.borrow_mut().insert(
                (client_id, tag),
                ChannelSlot { handler, service_id, seq: 0 },
            );

            if let Some(slot) = self.channels.borrow_mut().get_mut(&(client_id, tag)) {
                slot.handler.on_event(ChannelEvent::Connected);
            }
        }

        if let Some(slot) = self.channels.borrow_mut().get_mut(&(client_id, tag)) {
            slot.handler.on_event(ChannelEvent::Input(bytes));
        }
    }

    fn handle_channel_end(&mut self, client_id: ClientId, tag: u64, error_code: i32) {
        if let Some(state) = self.connections.get_mut(&client_id) {
            state.completed_tags.insert(tag);
        }
        if let Some(mut slot) = self.channels.borrow_mut().remove(&(client_id, tag)) {
            slot.handler.on_event(ChannelEvent::Completed(error_code));
        }
    }

    fn handle_disconnect(&mut self, client_id: ClientId) {
        self.connections.remove(&client_id);
        self.complete_connection(client_id, ErrorCode::ESHUTDOWN);
    }

    fn complete_connection(&mut self, client_id: ClientId, error_code: i32) {
        let mut tags: Vec<u64> = self
            .channels
            .borrow()
            .keys()
            .filter(|(id, _)| *id == client_id)
            .map(|(_, tag)| *tag)
            .collect();
        tags.sort_unstable();

        for tag in tags {
            if let Some(mut slot) = self.channels.borrow_mut().remove(&(client_id, tag)) {
                slot.handler.on_event(ChannelEvent::Completed(error_code));
            }
        }
    }
}
