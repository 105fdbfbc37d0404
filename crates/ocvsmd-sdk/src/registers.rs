//! Client-side adapters for `register.list` and `register.access`, both
//! map-style accumulation keyed by node-id.
//!
//! Spec: §4.6 closing paragraph groups these with Execute-Command under
//! the same fan-out skeleton; the SDK side mirrors that by reusing
//! [`crate::sender::submit_map`] the same way [`crate::execute_command`]
//! does.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ocvsmd_router::ClientRouterHandle;

use crate::sender::{submit_map, Outcome, Sender};

pub const LIST_SERVICE_NAME: &str = "ocvsmd.svc.register.list";
pub const ACCESS_SERVICE_NAME: &str = "ocvsmd.svc.register.access";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegisterValue {
    Empty,
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Serialize)]
struct RegisterListRequest {
    timeout_ms: u64,
    node_ids: Vec<u16>,
}

#[derive(Deserialize)]
struct RegisterListWire {
    node_id: u16,
    names: Vec<String>,
}

pub fn register_list(
    router: &ClientRouterHandle,
    node_ids: Vec<u16>,
    timeout: Duration,
) -> Sender<Outcome<HashMap<u16, Vec<String>>>> {
    let channel = router.make_channel(LIST_SERVICE_NAME);
    let request = RegisterListRequest { timeout_ms: timeout.as_millis() as u64, node_ids };
    let bytes = postcard::to_allocvec(&request).expect("register-list request always encodes");

    submit_map(
        channel,
        bytes,
        |bytes| {
            let wire: RegisterListWire = postcard::from_bytes(bytes).ok()?;
            Some((wire.node_id, wire.names))
        },
        false,
    )
}

#[derive(Debug, Clone, Serialize)]
struct RegisterAccessRequest {
    timeout_ms: u64,
    node_ids: Vec<u16>,
    name: String,
    /// `None` reads the register; `Some` writes it before reading back.
    value: Option<RegisterValue>,
}

#[derive(Deserialize)]
struct RegisterAccessWire {
    node_id: u16,
    value: RegisterValue,
}

pub fn register_read(
    router: &ClientRouterHandle,
    node_ids: Vec<u16>,
    name: String,
    timeout: Duration,
) -> Sender<Outcome<HashMap<u16, RegisterValue>>> {
    register_access(router, node_ids, name, None, timeout)
}

pub fn register_write(
    router: &ClientRouterHandle,
    node_ids: Vec<u16>,
    name: String,
    value: RegisterValue,
    timeout: Duration,
) -> Sender<Outcome<HashMap<u16, RegisterValue>>> {
    register_access(router, node_ids, name, Some(value), timeout)
}

fn register_access(
    router: &ClientRouterHandle,
    node_ids: Vec<u16>,
    name: String,
    value: Option<RegisterValue>,
    timeout: Duration,
) -> Sender<Outcome<HashMap<u16, RegisterValue>>> {
    let channel = router.make_channel(ACCESS_SERVICE_NAME);
    let request = RegisterAccessRequest { timeout_ms: timeout.as_millis() as u64, node_ids, name, value };
    let bytes = postcard::to_allocvec(&request).expect("register-access request always encodes");

    submit_map(
        channel,
        bytes,
        |bytes| {
            let wire: RegisterAccessWire = postcard::from_bytes(bytes).ok()?;
            Some((wire.node_id, wire.value))
        },
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_router::{ChannelEvent, ClientRouter, ServerRouter, ServiceRegistry};

    fn test_endpoint(name: &str) -> ocvsmd_address::Endpoint {
        ocvsmd_address::Endpoint::UnixAbstract(format!("ocvsmd-sdk-test-{name}").into_bytes())
    }

    fn scripted_access_daemon_factory(node_id: u16, value: RegisterValue) -> ocvsmd_router::ServiceFactory {
        Box::new(move |gateway: ocvsmd_router::Gateway| -> Box<dyn ocvsmd_router::ChannelHandler> {
            let value = value.clone();
            Box::new(move |event: ChannelEvent| {
                if let ChannelEvent::Input(_) = event {
                    let gateway = gateway.clone();
                    let wire = RegisterAccessWireOwned { node_id, value: value.clone() };
                    tokio::task::spawn_local(async move {
                        if let Ok(bytes) = postcard::to_allocvec(&wire) {
                            let _ = gateway.send(bytes).await;
                        }
                        gateway.complete(0).await;
                    });
                }
            })
        })
    }

    #[derive(Serialize)]
    struct RegisterAccessWireOwned {
        node_id: u16,
        value: RegisterValue,
    }

    #[tokio::test]
    async fn register_read_roundtrip() {
        let endpoint = test_endpoint("register-read");
        let mut registry = ServiceRegistry::new();
        registry
            .register(ACCESS_SERVICE_NAME, scripted_access_daemon_factory(10, RegisterValue::I64(42)))
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

                let outcome = register_read(
                    &handle,
                    vec![10],
                    "uavcan.node.id".to_string(),
                    Duration::from_secs(1),
                )
                .wait()
                .await;

                match outcome {
                    Outcome::Success(map) => assert_eq!(map.get(&10), Some(&RegisterValue::I64(42))),
                    Outcome::Failure(code) => panic!("expected success, got failure {code}"),
                }
            })
            .await;
    }
}
