//! Client-side adapters for the file-server root-list services.
//!
//! Spec: §8 scenario 2 ("Server streams one `Input` per configured root");
//! `list_roots` is list-style, `push_root`/`pop_root` are unit-style.

use serde::Serialize;

use ocvsmd_router::ClientRouterHandle;

use crate::sender::{submit_list, submit_unit, Outcome, Sender};

pub const LIST_ROOTS_SERVICE_NAME: &str = "ocvsmd.svc.file_server.list_roots";
pub const POP_ROOT_SERVICE_NAME: &str = "ocvsmd.svc.file_server.pop_root";
pub const PUSH_ROOT_SERVICE_NAME: &str = "ocvsmd.svc.file_server.push_root";

#[derive(Debug, Clone, Serialize)]
struct PushRootRequest {
    path: String,
}

pub fn list_roots(router: &ClientRouterHandle) -> Sender<Outcome<Vec<String>>> {
    let channel = router.make_channel(LIST_ROOTS_SERVICE_NAME);
    submit_list(channel, Vec::new(), |bytes| postcard::from_bytes::<String>(bytes).ok())
}

pub fn push_root(router: &ClientRouterHandle, path: String) -> Sender<Outcome<()>> {
    let channel = router.make_channel(PUSH_ROOT_SERVICE_NAME);
    let bytes = postcard::to_allocvec(&PushRootRequest { path }).expect("push-root request always encodes");
    submit_unit(channel, bytes)
}

pub fn pop_root(router: &ClientRouterHandle) -> Sender<Outcome<()>> {
    let channel = router.make_channel(POP_ROOT_SERVICE_NAME);
    submit_unit(channel, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_router::{ChannelEvent, ClientRouter, ServerRouter, ServiceRegistry};
    use ocvsmd_wire::ErrorCode;

    fn test_endpoint(name: &str) -> ocvsmd_address::Endpoint {
        ocvsmd_address::Endpoint::UnixAbstract(format!("ocvsmd-sdk-test-{name}").into_bytes())
    }

    fn streaming_daemon_factory(items: Vec<String>) -> ocvsmd_router::ServiceFactory {
        Box::new(move |gateway: ocvsmd_router::Gateway| -> Box<dyn ocvsmd_router::ChannelHandler> {
            let items = items.clone();
            Box::new(move |event: ChannelEvent| {
                if let ChannelEvent::Input(_) = event {
                    let gateway = gateway.clone();
                    let items = items.clone();
                    tokio::task::spawn_local(async move {
                        for item in items {
                            if let Ok(bytes) = postcard::to_allocvec(&item) {
                                let _ = gateway.send(bytes).await;
                            }
                        }
                        gateway.complete(0).await;
                    });
                }
            })
        })
    }

    fn unit_daemon_factory(code: i32) -> ocvsmd_router::ServiceFactory {
        Box::new(move |gateway: ocvsmd_router::Gateway| -> Box<dyn ocvsmd_router::ChannelHandler> {
            Box::new(move |event: ChannelEvent| {
                if let ChannelEvent::Input(_) = event {
                    let gateway = gateway.clone();
                    tokio::task::spawn_local(async move {
                        gateway.complete(code).await;
                    });
                }
            })
        })
    }

    #[tokio::test]
    async fn list_roots_collects_every_streamed_root() {
        let endpoint = test_endpoint("file-server-list-roots");
        let mut registry = ServiceRegistry::new();
        registry
            .register(
                LIST_ROOTS_SERVICE_NAME,
                streaming_daemon_factory(vec!["/srv/a".to_string(), "/srv/b".to_string()]),
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

                let outcome = list_roots(&handle).wait().await;
                assert_eq!(outcome, Outcome::Success(vec!["/srv/a".to_string(), "/srv/b".to_string()]));
            })
            .await;
    }

    #[tokio::test]
    async fn pop_root_on_empty_list_surfaces_failure() {
        let endpoint = test_endpoint("file-server-pop-root-empty");
        let mut registry = ServiceRegistry::new();
        registry
            .register(POP_ROOT_SERVICE_NAME, unit_daemon_factory(ErrorCode::EINVAL))
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

                let outcome = pop_root(&handle).wait().await;
                assert_eq!(outcome, Outcome::Failure(ErrorCode::EINVAL));
            })
            .await;
    }
}
