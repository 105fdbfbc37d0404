//! Register access services: `register.list` and `register.access`
//! (read/write), both adapters over the Execute-Command fan-out skeleton.
//!
//! Spec: §4.6 closing paragraph — "register-list/read/write ... follow
//! the same skeleton".

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ocvsmd_presentation::{Presentation, Service};
use ocvsmd_router::{ChannelEvent, ChannelHandler, Gateway, ServiceFactory};
use ocvsmd_wire::ErrorCode;

use crate::fanout::run_fan_out;

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

// --- register.list ---------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterListRequest {
    pub timeout_ms: u64,
    pub node_ids: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterListResponse {
    pub node_id: u16,
    pub names: Vec<String>,
}

pub struct RegisterListCyphalRequest;
pub struct RegisterListCyphalResponse {
    pub names: Vec<String>,
}

pub struct RegisterListService;
impl Service for RegisterListService {
    type Request = RegisterListCyphalRequest;
    type Response = RegisterListCyphalResponse;
    const NAME: &'static str = "uavcan.register.List";
}

struct RegisterListFsm<P> {
    gateway: Gateway,
    presentation: Rc<P>,
    tasks: Rc<RefCell<Vec<tokio::task::JoinHandle<()>>>>,
}

impl<P> ChannelHandler for RegisterListFsm<P>
where
    P: Presentation<RegisterListService> + 'static,
{
    fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {}
            ChannelEvent::Input(bytes) => self.on_input(bytes),
            ChannelEvent::Completed(_) => self.cancel_all(),
        }
    }
}

impl<P> RegisterListFsm<P>
where
    P: Presentation<RegisterListService> + 'static,
{
    fn on_input(&mut self, bytes: Vec<u8>) {
        let request: RegisterListRequest = match postcard::from_bytes(&bytes) {
            Ok(request) => request,
            Err(_) => {
                let gateway = self.gateway.clone();
                let handle = tokio::task::spawn_local(async move {
                    gateway.complete(ErrorCode::EINVAL).await;
                });
                self.tasks.borrow_mut().push(handle);
                return;
            }
        };

        let gateway = self.gateway.clone();
        let presentation = self.presentation.clone();
        let tasks = self.tasks.clone();
        let timeout = Duration::from_millis(request.timeout_ms);

        let handle = tokio::task::spawn_local(async move {
            let handles = run_fan_out(
                gateway,
                presentation,
                request.node_ids,
                timeout,
                |_node_id| RegisterListCyphalRequest,
                |node_id, response| {
                    postcard::to_allocvec(&RegisterListResponse { node_id, names: response.names }).ok()
                },
            )
            .await;
            tasks.borrow_mut().extend(handles);
        });
        self.tasks.borrow_mut().push(handle);
    }

    fn cancel_all(&mut self) {
        for task in self.tasks.borrow_mut().drain(..) {
            task.abort();
        }
    }
}

pub fn list_factory<P>(presentation: Rc<P>) -> ServiceFactory
where
    P: Presentation<RegisterListService> + 'static,
{
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(RegisterListFsm {
            gateway,
            presentation: presentation.clone(),
            tasks: Rc::new(RefCell::new(Vec::new())),
        })
    })
}

// --- register.access (read/write) ------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccessRequest {
    pub timeout_ms: u64,
    pub node_ids: Vec<u16>,
    pub name: String,
    /// `None` reads the register; `Some` writes it before reading back.
    pub value: Option<RegisterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccessResponse {
    pub node_id: u16,
    pub value: RegisterValue,
}

pub struct RegisterAccessCyphalRequest {
    pub name: String,
    pub value: Option<RegisterValue>,
}

pub struct RegisterAccessCyphalResponse {
    pub value: RegisterValue,
}

pub struct RegisterAccessService;
impl Service for RegisterAccessService {
    type Request = RegisterAccessCyphalRequest;
    type Response = RegisterAccessCyphalResponse;
    const NAME: &'static str = "uavcan.register.Access";
}

struct RegisterAccessFsm<P> {
    gateway: Gateway,
    presentation: Rc<P>,
    tasks: Rc<RefCell<Vec<tokio::task::JoinHandle<()>>>>,
}

impl<P> ChannelHandler for RegisterAccessFsm<P>
where
    P: Presentation<RegisterAccessService> + 'static,
{
    fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {}
            ChannelEvent::Input(bytes) => self.on_input(bytes),
            ChannelEvent::Completed(_) => self.cancel_all(),
        }
    }
}

impl<P> RegisterAccessFsm<P>
where
    P: Presentation<RegisterAccessService> + 'static,
{
    fn on_input(&mut self, bytes: Vec<u8>) {
        let request: RegisterAccessRequest = match postcard::from_bytes(&bytes) {
            Ok(request) => request,
            Err(_) => {
                let gateway = self.gateway.clone();
                let handle = tokio::task::spawn_local(async move {
                    gateway.complete(ErrorCode::EINVAL).await;
                });
                self.tasks.borrow_mut().push(handle);
                return;
            }
        };

        let RegisterAccessRequest { timeout_ms, node_ids, name, value } = request;
        let gateway = self.gateway.clone();
        let presentation = self.presentation.clone();
        let tasks = self.tasks.clone();
        let timeout = Duration::from_millis(timeout_ms);

        let handle = tokio::task::spawn_local(async move {
            let handles = run_fan_out(
                gateway,
                presentation,
                node_ids,
                timeout,
                move |_node_id| RegisterAccessCyphalRequest {
                    name: name.clone(),
                    value: value.clone(),
                },
                |node_id, response| {
                    postcard::to_allocvec(&RegisterAccessResponse { node_id, value: response.value }).ok()
                },
            )
            .await;
            tasks.borrow_mut().extend(handles);
        });
        self.tasks.borrow_mut().push(handle);
    }

    fn cancel_all(&mut self) {
        for task in self.tasks.borrow_mut().drain(..) {
            task.abort();
        }
    }
}

pub fn access_factory<P>(presentation: Rc<P>) -> ServiceFactory
where
    P: Presentation<RegisterAccessService> + 'static,
{
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(RegisterAccessFsm {
            gateway,
            presentation: presentation.clone(),
            tasks: Rc::new(RefCell::new(Vec::new())),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocvsmd_presentation::{MockPresentation, ScriptedOutcome};
    use ocvsmd_router::{ClientRouter, ServerRouter, ServiceRegistry};
    use std::cell::RefCell as StdRefCell;
    use std::time::Duration as StdDuration;

    fn test_endpoint(name: &str) -> ocvsmd_address::Endpoint {
        ocvsmd_address::Endpoint::UnixAbstract(format!("ocvsmd-daemon-test-{name}").into_bytes())
    }

    #[tokio::test]
    async fn register_access_read_roundtrip() {
        let endpoint = test_endpoint("register-access-read");

        let presentation: Rc<MockPresentation<RegisterAccessService>> = Rc::new(MockPresentation::new());
        presentation.script(
            10,
            ScriptedOutcome::Responds(RegisterAccessCyphalResponse { value: RegisterValue::I64(42) }),
        );

        let mut registry = ServiceRegistry::new();
        registry.register(ACCESS_SERVICE_NAME, access_factory(presentation.clone())).unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let server_router = ServerRouter::bind(&endpoint, registry).await.unwrap();
                tokio::task::spawn_local(server_router.run());
                tokio::task::yield_now().await;

                let client_router = ClientRouter::connect(&endpoint).await.unwrap();
                let handle = client_router.handle();
                tokio::task::spawn_local(client_router.run());

                let channel = handle.make_channel(ACCESS_SERVICE_NAME);
                let events = Rc::new(StdRefCell::new(Vec::new()));
                let events_for_handler = events.clone();
                channel.subscribe(move |event: ChannelEvent| {
                    events_for_handler.borrow_mut().push(event);
                });

                let request = RegisterAccessRequest {
                    timeout_ms: 1000,
                    node_ids: vec![10],
                    name: "uavcan.node.id".to_string(),
                    value: None,
                };
                channel.send(postcard::to_allocvec(&request).unwrap()).await.unwrap();

                for _ in 0..200 {
                    if events.borrow().len() >= 3 {
                        break;
                    }
                    tokio::time::sleep(StdDuration::from_millis(5)).await;
                }

                let observed = events.borrow().clone();
                assert_eq!(observed[0], ChannelEvent::Connected);
                let response: RegisterAccessResponse = match &observed[1] {
                    ChannelEvent::Input(bytes) => postcard::from_bytes(bytes).unwrap(),
                    other => panic!("expected Input, got {other:?}"),
                };
                assert_eq!(response.node_id, 10);
                assert_eq!(response.value, RegisterValue::I64(42));
                assert_eq!(observed[2], ChannelEvent::Completed(0));
            })
            .await;
    }
}
