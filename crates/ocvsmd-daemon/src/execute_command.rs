//! The Execute-Command service: the canonical FSM that every other
//! standardized service is modelled after.
//!
//! Spec: §4.6 "Service dispatch (daemon side) — the Execute-Command
//! service as canonical FSM".

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ocvsmd_presentation::{Presentation, Service};
use ocvsmd_router::{ChannelEvent, ChannelHandler, Gateway, ServiceFactory};
use ocvsmd_wire::ErrorCode;

use crate::fanout::run_fan_out;

pub const SERVICE_NAME: &str = "ocvsmd.svc.node.execute_command";

/// The embedded `uavcan.node.ExecuteCommand` payload, opaque to this crate
/// beyond its command code and parameter bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandRequest {
    pub timeout_ms: u64,
    pub node_ids: Vec<u16>,
    pub command: u16,
    pub parameter: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandResponse {
    pub node_id: u16,
    pub status: u8,
    pub output: Vec<u8>,
}

/// The per-node Cyphal request/response pair, as exchanged with the
/// presentation collaborator.
pub struct ExecuteCommandCyphalRequest {
    pub command: u16,
    pub parameter: Vec<u8>,
}

pub struct ExecuteCommandCyphalResponse {
    pub status: u8,
    pub output: Vec<u8>,
}

pub struct ExecuteCommandService;

impl Service for ExecuteCommandService {
    type Request = ExecuteCommandCyphalRequest;
    type Response = ExecuteCommandCyphalResponse;
    const NAME: &'static str = "uavcan.node.ExecuteCommand";
}

struct ExecuteCommandFsm<P> {
    gateway: Gateway,
    presentation: Rc<P>,
    tasks: Rc<RefCell<Vec<tokio::task::JoinHandle<()>>>>,
}

impl<P> ChannelHandler for ExecuteCommandFsm<P>
where
    P: Presentation<ExecuteCommandService> + 'static,
{
    fn on_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {}
            ChannelEvent::Input(bytes) => self.on_input(bytes),
            // The client cancelled (or the connection dropped) before we
            // completed; drop every in-flight promise. The router has
            // already removed the channel from its table, so there is no
            // second `complete()` to issue.
            ChannelEvent::Completed(_error_code) => self.cancel_all(),
        }
    }
}

impl<P> ExecuteCommandFsm<P>
where
    P: Presentation<ExecuteCommandService> + 'static,
{
    fn on_input(&mut self, bytes: Vec<u8>) {
        let request: ExecuteCommandRequest = match postcard::from_bytes(&bytes) {
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

        let ExecuteCommandRequest { timeout_ms, node_ids, command, parameter } = request;
        let timeout = Duration::from_millis(timeout_ms);
        let gateway = self.gateway.clone();
        let presentation = self.presentation.clone();
        let tasks = self.tasks.clone();

        let handle = tokio::task::spawn_local(async move {
            let handles = run_fan_out(
                gateway,
                presentation,
                node_ids,
                timeout,
                move |_node_id| ExecuteCommandCyphalRequest {
                    command,
                    parameter: parameter.clone(),
                },
                |node_id, response| {
                    postcard::to_allocvec(&ExecuteCommandResponse {
                        node_id,
                        status: response.status,
                        output: response.output,
                    })
                    .ok()
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

/// Build the service factory for registration in a [`ServiceRegistry`].
pub fn factory<P>(presentation: Rc<P>) -> ServiceFactory
where
    P: Presentation<ExecuteCommandService> + 'static,
{
    Box::new(move |gateway: Gateway| -> Box<dyn ChannelHandler> {
        Box::new(ExecuteCommandFsm {
            gateway,
            presentation: presentation.clone(),
            tasks: Rc::new(RefCell::new(Vec::new())),
        })
    })
}
