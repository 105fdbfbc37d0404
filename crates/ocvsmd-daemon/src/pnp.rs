//! PnP node-ID allocation: the daemon hands out node-ids to nodes
//! presenting a unique-id, remembering prior allocations for the
//! lifetime of the process.
//!
//! Spec: §1 "PnP node-ID allocation ... specified in the repo as thin
//! wrappers"; §3 "no in-memory persistence beyond the lifetime of the
//! daemon process" — the allocation table is exactly that, process
//! lifetime only.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use ocvsmd_router::{ChannelEvent, ChannelHandler, Gateway, ServiceFactory};
use ocvsmd_wire::ErrorCode;

pub const ALLOCATE_SERVICE_NAME: &str = "ocvsmd.svc.pnp.allocate";

/// Cyphal classic's non-anonymous node-id range is 1..=125; id 0 and the
/// anonymous/broadcast range above 125 are never handed out here.
const FIRST_NODE_ID: u16 = 1;
const LAST_NODE_ID: u16 = 125;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateRequest {
    pub unique_id: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub node_id: u16,
}

struct AllocationTable {
    by_unique_id: HashMap<Vec<u8>, u16>,
    next_candidate: u16,
}

impl AllocationTable {
    fn allocate(&mut self, unique_id: Vec<u8>) -> Option<u16> {
        if let Some(&existing) = self.by_unique_id.get(&unique_id) {
            return Some(existing);
        }
        let taken: std::collections::HashSet<u16> = self.by_unique_id.values().copied().collect();
        for _ in FIRST_NODE_ID..=LAST_NODE_ID {
            let candidate = self.next_candidate;
            self.next_candidate = if candidate >= LAST_NODE_ID { FIRST_NODE_ID } else { candidate + 1 };
            if !taken.contains(&candidate) {
                self.by_unique_id.insert(unique_id, candidate);
                return Some(candidate);
            }
        }
        None
    }
}

pub type Allocator = Rc<RefCell<AllocationTable>>;

pub fn new_allocator() -> Allocator {
    Rc::new(RefCell::new(AllocationTable {
        by_unique_id: HashMap::new(),
        next_candidate: FIRST_NODE_ID,
    }))
}

struct AllocateFsm {
    gateway: Gateway,
    allocator: Allocator,
}

impl ChannelHandler for AllocateFsm {
    fn on_event(&mut self, event: ChannelEvent) {
        if let ChannelEvent::Input(bytes) = event {
            let gateway = self.gateway.clone();
            let request: Result<AllocateRequest, _> = postcard::from_bytes(&bytes);
            let allocator = self.allocator.clone();
            tokio::task::spawn_local(async move {
                let request = match request {
                    Ok(request) => request,
                    Err(_) => {
                        gateway.complete(ErrorCode::EINVAL).await;
                        return;
                    }
                };
                // Extract the allocation result before any `.await` so the
                // `RefCell` borrow never spans a suspension point — other
                // channels may be allocating concurrently against the same
                // table.
                let allocated = allocator.borrow_mut().allocate(request.unique_id);
                match allocated {
                    Some(node_id) => {
                        if let Ok(bytes) = postcard::to_allocvec(&AllocateResponse { node_id }) {
                            let _ = gateway.send(bytes).await;
                        }
                        gateway.complete(0).await;
                    }
                    None => gateway.complete(ErrorCode::ENOMEM).await,
                }
            });
        }
    }
}

pub fn allocate_factory(allocator: Allocator) -> ServiceFactory {
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(AllocateFsm { gateway, allocator: allocator.clone() })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_router::{ClientRouter, ServerRouter, ServiceRegistry};
    use std::cell::RefCell as StdRefCell;
    use std::time::Duration;

    fn test_endpoint(name: &str) -> ocvsmd_address::Endpoint {
        ocvsmd_address::Endpoint::UnixAbstract(format!("ocvsmd-daemon-test-{name}").into_bytes())
    }

    #[tokio::test]
    async fn repeated_allocation_for_same_unique_id_is_stable() {
        let endpoint = test_endpoint("pnp-allocate");
        let allocator = new_allocator();

        let mut registry = ServiceRegistry::new();
        registry
            .register(ALLOCATE_SERVICE_NAME, allocate_factory(allocator))
            .unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server_router = ServerRouter::bind(&endpoint, registry).await.unwrap();
                tokio::task::spawn_local(server_router.run());
                tokio::task::yield_now().await;

                let client_router = ClientRouter::connect(&endpoint).await.unwrap();
                let handle = client_router.handle();
                tokio::task::spawn_local(client_router.run());

                let channel = handle.make_channel(ALLOCATE_SERVICE_NAME);
                let events = Rc::new(StdRefCell::new(Vec::new()));
                let events_for_handler = events.clone();
                channel.subscribe(move |event: ChannelEvent| {
                    events_for_handler.borrow_mut().push(event);
                });

                let request = AllocateRequest { unique_id: vec![1, 2, 3] };
                channel.send(postcard::to_allocvec(&request).unwrap()).await.unwrap();

                for _ in 0..200 {
                    if events.borrow().len() >= 3 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }

                let observed = events.borrow().clone();
                assert_eq!(observed[0], ChannelEvent::Connected);
                let response: AllocateResponse = match &observed[1] {
                    ChannelEvent::Input(bytes) => postcard::from_bytes(bytes).unwrap(),
                    other => panic!("expected Input, got {other:?}"),
                };
                assert_eq!(response.node_id, FIRST_NODE_ID);
                assert_eq!(observed[2], ChannelEvent::Completed(0));
            })
            .await;
    }
}
