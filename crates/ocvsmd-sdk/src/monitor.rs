//! Client-side adapter for the network monitor snapshot: list-style
//! accumulation of the daemon's current view of the bus.

use serde::{Deserialize, Serialize};

use ocvsmd_router::ClientRouterHandle;

use crate::sender::{submit_list, Outcome, Sender};

pub const SNAPSHOT_SERVICE_NAME: &str = "ocvsmd.svc.monitor.snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: u16,
    pub health: u8,
    pub mode: u8,
}

pub fn snapshot(router: &ClientRouterHandle) -> Sender<Outcome<Vec<NodeSnapshot>>> {
    let channel = router.make_channel(SNAPSHOT_SERVICE_NAME);
    submit_list(channel, Vec::new(), |bytes| postcard::from_bytes::<NodeSnapshot>(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_router::{ChannelEvent, ClientRouter, ServerRouter, ServiceRegistry};

    fn test_endpoint(name: &str) -> ocvsmd_address::Endpoint {
        ocvsmd_address::Endpoint::UnixAbstract(format!("ocvsmd-sdk-test-{name}").into_bytes())
    }

    fn scripted_daemon_factory(nodes: Vec<NodeSnapshot>) -> ocvsmd_router::ServiceFactory {
        Box::new(move |gateway: ocvsmd_router::Gateway| -> Box<dyn ocvsmd_router::ChannelHandler> {
            let nodes = nodes.clone();
            Box::new(move |event: ChannelEvent| {
                if let ChannelEvent::Input(_) = event {
                    let gateway = gateway.clone();
                    let nodes = nodes.clone();
                    tokio::task::spawn_local(async move {
                        for node in nodes {
                            if let Ok(bytes) = postcard::to_allocvec(&node) {
                                let _ = gateway.send(bytes).await;
                            }
                        }
                        gateway.complete(0).await;
                    });
                }
            })
        })
    }

    #[tokio::test]
    async fn snapshot_collects_known_nodes() {
        let endpoint = test_endpoint("monitor-snapshot");
        let mut registry = ServiceRegistry::new();
        registry
            .register(
                SNAPSHOT_SERVICE_NAME,
                scripted_daemon_factory(vec![NodeSnapshot { node_id: 42, health: 0, mode: 0 }]),
            )
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

                let outcome = snapshot(&handle).wait().await;
                assert_eq!(outcome, Outcome::Success(vec![NodeSnapshot { node_id: 42, health: 0, mode: 0 }]));
            })
            .await;
    }
}
