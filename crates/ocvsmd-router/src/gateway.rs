//! The server router's per-channel handle used by a service handler to
//! send `Input`s and to complete the channel.
//!
//! Spec GLOSSARY: "Gateway — the router's per-channel internal handle
//! used to deliver events to a typed channel and to send outbound route
//! messages."

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ocvsmd_transport::{ClientId, ServerSender, TransportError};
use ocvsmd_wire::{encode_route, Route};

use crate::event::ChannelHandler;

pub(crate) struct ChannelSlot {
    pub(crate) handler: Box<dyn ChannelHandler>,
    pub(crate) service_id: u64,
    pub(crate) seq: u64,
}

pub(crate) type ChannelTable = Rc<RefCell<HashMap<(ClientId, u64), ChannelSlot>>>;

#[derive(Clone)]
pub struct Gateway {
    pub(crate) sender: ServerSender,
    pub(crate) channels: ChannelTable,
    pub(crate) client_id: ClientId,
    pub(crate) tag: u64,
}

impl Gateway {
    /// Send one `Input` on this channel. A no-op if the channel has
    /// already been completed (by either side) and removed from the
    /// table — the same "drop it on the floor" policy the router applies
    /// to any late frame for a completed channel.
    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let route_bytes = {
            let mut channels = self.channels.borrow_mut();
            let Some(slot) = channels.get_mut(&(self.client_id, self.tag)) else {
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
        self.sender.send(self.client_id, &[route_bytes.as_slice()]).await
    }

    /// Complete this channel with `error_code` (0 == success) and release
    /// its table entry. A second call is a no-op.
    pub async fn complete(&self, error_code: i32) {
        let removed = self.channels.borrow_mut().remove(&(self.client_id, self.tag));
        if removed.is_none() {
            return;
        }
        let route = Route::ChannelEnd { tag: self.tag, error_code };
        if let Ok(bytes) = encode_route(&route) {
            let _ = self.sender.send(self.client_id, &[bytes.as_slice()]).await;
        }
    }
}
