//! File-server root-list services: served entirely from local daemon
//! configuration, with no Cyphal fan-out — the content-serving side
//! (`uavcan.file.*` servers) is itself out of scope.
//!
//! Spec: §1 "File-content serving over Cyphal ... specified in the repo
//! as thin wrappers"; §8 scenario 2 ("Server streams one `Input` per
//! configured root ... and `ChannelEnd{tag, 0}`").

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ocvsmd_router::{ChannelEvent, ChannelHandler, Gateway, ServiceFactory};
use ocvsmd_wire::ErrorCode;

pub const LIST_ROOTS_SERVICE_NAME: &str = "ocvsmd.svc.file_server.list_roots";
pub const POP_ROOT_SERVICE_NAME: &str = "ocvsmd.svc.file_server.pop_root";
pub const PUSH_ROOT_SERVICE_NAME: &str = "ocvsmd.svc.file_server.push_root";

/// The daemon's configured file-server root list, shared by the three
/// services below. A single daemon process owns exactly one instance.
pub type Roots = Rc<RefCell<Vec<String>>>;

pub fn new_roots(initial: Vec<String>) -> Roots {
    Rc::new(RefCell::new(initial))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRootRequest {
    pub path: String,
}

struct ListRootsFsm {
    gateway: Gateway,
    roots: Roots,
}

impl ChannelHandler for ListRootsFsm {
    fn on_event(&mut self, event: ChannelEvent) {
        if let ChannelEvent::Input(_) = event {
            let gateway = self.gateway.clone();
            let roots: Vec<String> = self.roots.borrow().clone();
            tokio::task::spawn_local(async move {
                for root in roots {
                    if let Ok(bytes) = postcard::to_allocvec(&root) {
                        let _ = gateway.send(bytes).await;
                    }
                }
                gateway.complete(0).await;
            });
        }
    }
}

pub fn list_roots_factory(roots: Roots) -> ServiceFactory {
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(ListRootsFsm { gateway, roots: roots.clone() })
    })
}

struct PushRootFsm {
    gateway: Gateway,
    roots: Roots,
}

impl ChannelHandler for PushRootFsm {
    fn on_event(&mut self, event: ChannelEvent) {
        if let ChannelEvent::Input(bytes) = event {
            let gateway = self.gateway.clone();
            let request: Result<PushRootRequest, _> = postcard::from_bytes(&bytes);
            let roots = self.roots.clone();
            tokio::task::spawn_local(async move {
                match request {
                    Ok(request) => {
                        roots.borrow_mut().push(request.path);
                        gateway.complete(0).await;
                    }
                    Err(_) => gateway.complete(ErrorCode::EINVAL).await,
                }
            });
        }
    }
}

pub fn push_root_factory(roots: Roots) -> ServiceFactory {
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(PushRootFsm { gateway, roots: roots.clone() })
    })
}

struct PopRootFsm {
    gateway: Gateway,
    roots: Roots,
}

impl ChannelHandler for PopRootFsm {
    fn on_event(&mut self, event: ChannelEvent) {
        if let ChannelEvent::Input(_) = event {
            let gateway = self.gateway.clone();
            let popped = self.roots.borrow_mut().pop();
            tokio::task::spawn_local(async move {
                match popped {
                    Some(_) => gateway.complete(0).await,
                    None => {
                        debug!("pop_root called with an empty root list");
                        gateway.complete(ErrorCode::EINVAL).await;
                    }
                }
            });
        }
    }
}

pub fn pop_root_factory(roots: Roots) -> ServiceFactory {
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(PopRootFsm { gateway, roots: roots.clone() })
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
    async fn list_roots_streams_configured_roots() {
        let endpoint = test_endpoint("file-server-list");
        let roots = new_roots(vec!["/srv/a".to_string(), "/srv/b".to_string()]);

        let mut registry = ServiceRegistry::new();
        registry
            .register(LIST_ROOTS_SERVICE_NAME, list_roots_factory(roots))
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

                let channel = handle.make_channel(LIST_ROOTS_SERVICE_NAME);
                let events = Rc::new(StdRefCell::new(Vec::new()));
                let events_for_handler = events.clone();
                channel.subscribe(move |event: ChannelEvent| {
                    events_for_handler.borrow_mut().push(event);
                });

                channel.send(Vec::new()).await.unwrap();

                for _ in 0..200 {
                    if events.borrow().len() >= 4 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }

                let observed = events.borrow().clone();
                assert_eq!(observed[0], ChannelEvent::Connected);
                let roots: Vec<String> = observed[1..3]
                    .iter()
                    .map(|event| match event {
                        ChannelEvent::Input(bytes) => postcard::from_bytes(bytes).unwrap(),
                        other => panic!("expected Input, got {other:?}"),
                    })
                    .collect();
                assert_eq!(roots, vec!["/srv/a".to_string(), "/srv/b".to_string()]);
                assert_eq!(observed[3], ChannelEvent::Completed(0));
            })
            .await;
    }
}
