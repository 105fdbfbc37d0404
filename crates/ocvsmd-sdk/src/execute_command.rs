//! Client-side adapter for the Execute-Command service: map-style
//! accumulation keyed by node-id.
//!
//! Spec: §8 scenario 3 ("SDK surfaces `Success({42: Response{status:0}})`")
//! and scenario 4 ("SDK surfaces `Failure(ENOMEM)`").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ocvsmd_router::ClientRouterHandle;

use crate::sender::{submit_map, Outcome, Sender};

pub const SERVICE_NAME: &str = "ocvsmd.svc.node.execute_command";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandRequest {
    pub timeout_ms: u64,
    pub node_ids: Vec<u16>,
    pub command: u16,
    pub parameter: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommandResponse {
    pub status: u8,
    pub output: Vec<u8>,
}

pub fn execute_command(
    router: &ClientRouterHandle,
    node_ids: Vec<u16>,
    timeout: Duration,
    command: u16,
    parameter: Vec<u8>,
) -> Sender<Outcome<std::collections::HashMap<u16, ExecuteCommandResponse>>> {
    let channel = router.make_channel(SERVICE_NAME);
    let request = ExecuteCommandRequest {
        timeout_ms: timeout.as_millis() as u64,
        node_ids,
        command,
        parameter,
    };
    let bytes = postcard::to_allocvec(&request).expect("execute-command request always encodes");

    submit_map(
        channel,
        bytes,
        |bytes| {
            #[derive(Deserialize)]
            struct Wire {
                node_id: u16,
                status: u8,
                output: Vec<u8>,
            }
            let wire: Wire = postcard::from_bytes(bytes).ok()?;
            Some((wire.node_id, ExecuteCommandResponse { status: wire.status, output: wire.output }))
        },
        // The daemon's completion code is only ever non-zero when zero
        // nodes were dispatched (a `make_client` failure aborts before
        // any request is issued), so there is never a genuinely partial
        // map alongside a non-zero code here.
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_router::{ChannelEvent, ClientRouter, ServerRouter, ServiceRegistry};
    use ocvsmd_wire::ErrorCode;

    fn test_endpoint(name: &str) -> ocvsmd_address::Endpoint {
        ocvsmd_address::Endpoint::UnixAbstract(format!("ocvsmd-sdk-test-{name}").into_bytes())
    }

    /// A minimal stand-in daemon handler that plays back one scripted
    /// response per request, mirroring the wire shape `ocvsmd-daemon`
    /// actually emits without depending on that crate.
    fn scripted_daemon_factory(
        responses: Vec<(u16, u8, Vec<u8>)>,
        completion_code: i32,
    ) -> ocvsmd_router::ServiceFactory {
        Box::new(move |gateway: ocvsmd_router::Gateway| -> Box<dyn ocvsmd_router::ChannelHandler> {
            let responses = responses.clone();
            Box::new(move |event: ChannelEvent| {
                if let ChannelEvent::Input(_) = event {
                    let gateway = gateway.clone();
                    let responses = responses.clone();
                    tokio::task::spawn_local(async move {
                        #[derive(Serialize)]
                        struct Wire {
                            node_id: u16,
                            status: u8,
                            output: Vec<u8>,
                        }
                        for (node_id, status, output) in responses {
                            if let Ok(bytes) = postcard::to_allocvec(&Wire { node_id, status, output }) {
                                let _ = gateway.send(bytes).await;
                            }
                        }
                        gateway.complete(completion_code).await;
                    });
                }
            })
        })
    }

    #[tokio::test]
    async fn success_case_surfaces_partial_map() {
        let endpoint = test_endpoint("execute-command-success");
        let mut registry = ServiceRegistry::new();
        registry
            .register(SERVICE_NAME, scripted_daemon_factory(vec![(42, 0, Vec::new())], 0))
            .unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server_router = ServerRouter::bind(&endpoint, registry).await.unwrap();
                tokio::task::spawn_local(server_router.run());
                tokio::task::yield_now().await;

                let client_router = ClientRouter::connect(&endpoint).await.unwrap();
                let router_handle = client_router.handle();
                tokio::task::spawn_local(client_router.run());

                let sender = execute_command(
                    &router_handle,
                    vec![42, 43, 42],
                    std::time::Duration::from_secs(1),
                    1,
                    Vec::new(),
                );
                let outcome = sender.wait().await;
                match outcome {
                    Outcome::Success(map) => {
                        assert_eq!(map.len(), 1);
                        assert_eq!(map.get(&42).unwrap().status, 0);
                    }
                    Outcome::Failure(code) => panic!("expected success, got failure {code}"),
                }
            })
            .await;
    }

    #[tokio::test]
    async fn out_of_memory_case_surfaces_failure() {
        let endpoint = test_endpoint("execute-command-oom");
        let mut registry = ServiceRegistry::new();
        registry
            .register(SERVICE_NAME, scripted_daemon_factory(Vec::new(), ErrorCode::ENOMEM))
            .unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server_router = ServerRouter::bind(&endpoint, registry).await.unwrap();
                tokio::task::spawn_local(server_router.run());
                tokio::task::yield_now().await;

                let client_router = ClientRouter::connect(&endpoint).await.unwrap();
                let router_handle = client_router.handle();
                tokio::task::spawn_local(client_router.run());

                let sender = execute_command(
                    &router_handle,
                    vec![7],
                    std::time::Duration::from_secs(1),
                    1,
                    Vec::new(),
                );
                let outcome = sender.wait().await;
                assert_eq!(outcome, Outcome::Failure(ErrorCode::ENOMEM));
            })
            .await;
    }
}
