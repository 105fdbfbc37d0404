//! Network monitor snapshot: streams the daemon's current view of nodes
//! observed on the bus.
//!
//! Spec: §1 "node monitoring ... specified in the repo as thin wrappers
//! that, once the two core subsystems exist, are straightforward
//! adapters"; §4.6 closing paragraph groups "monitor snapshot" with the
//! other list-style services.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use ocvsmd_router::{ChannelEvent, ChannelHandler, Gateway, ServiceFactory};

pub const SNAPSHOT_SERVICE_NAME: &str = "ocvsmd.svc.monitor.snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: u16,
    pub health: u8,
    pub mode: u8,
}

/// The daemon's live view of the bus, updated out of band (by whatever
/// subscribes to `uavcan.node.Heartbeat` over the Cyphal transport — not
/// this crate's concern) and read here only.
pub type KnownNodes = Rc<RefCell<Vec<NodeSnapshot>>>;

pub fn new_known_nodes() -> KnownNodes {
    Rc::new(RefCell::new(Vec::new()))
}

struct SnapshotFsm {
    gateway: Gateway,
    known_nodes: KnownNodes,
}

impl ChannelHandler for SnapshotFsm {
    fn on_event(&mut self, event: ChannelEvent) {
        if let ChannelEvent::Input(_) = event {
            let gateway = self.gateway.clone();
            let snapshot = self.known_nodes.borrow().clone();
            tokio::task::spawn_local(async move {
                for entry in snapshot {
                    if let Ok(bytes) = postcard::to_allocvec(&entry) {
                        let _ = gateway.send(bytes).await;
                    }
                }
                gateway.complete(0).await;
            });
        }
    }
}

pub fn snapshot_factory(known_nodes: KnownNodes) -> ServiceFactory {
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(SnapshotFsm { gateway, known_nodes: known_nodes.clone() })
    })
}
