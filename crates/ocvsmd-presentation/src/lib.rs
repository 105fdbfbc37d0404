//! The Cyphal presentation-layer collaborator interface.
//!
//! Spec: §1 "Out of scope ... the core **consumes** a `Presentation`
//! capability exposing `make_client<Service>(node_id)` and
//! `make_server<Service>()` with promise-style responses; it does not
//! reimplement them." This crate defines only that consumed interface
//! (plus an in-memory mock for exercising the daemon's fan-out logic
//! without real Cyphal transports) — no UDP/CAN media, no DSDL codecs.

mod mock;

use std::time::Duration;

use tokio::sync::oneshot;

pub use mock::{MockClient, MockPresentation, ScriptedOutcome};

/// A Cyphal service type: request/response payload types plus the fixed
/// textual service name used to resolve it on the network.
pub trait Service {
    type Request: Send + 'static;
    type Response: Send + 'static;

    const NAME: &'static str;
}

/// Failure to construct a service client or server, mirroring the
/// translation table in spec §4.6 step 2a.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MakeClientError {
    Memory,
    Argument,
    Anonymous,
    AlreadyExists,
    Capacity,
    Platform(i32),
}

impl MakeClientError {
    /// Map to the wire error-code taxonomy, per spec §4.6 step 2a.
    pub fn as_error_code(self) -> i32 {
        use ocvsmd_wire::ErrorCode;
        match self {
            MakeClientError::Memory => ErrorCode::ENOMEM,
            MakeClientError::Argument => ErrorCode::EINVAL,
            MakeClientError::Anonymous => ErrorCode::EINVAL,
            MakeClientError::AlreadyExists => ErrorCode::EEXIST,
            MakeClientError::Capacity => ErrorCode::ENOMEM,
            MakeClientError::Platform(code) => code,
        }
    }
}

/// Failure to issue a request on an already-constructed client, mirroring
/// the translation table in spec §4.6 step 2b ("same translation and
/// completion" as a `make_client` failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueError {
    Memory,
    Argument,
    Capacity,
    Platform(i32),
}

impl IssueError {
    pub fn as_error_code(self) -> i32 {
        use ocvsmd_wire::ErrorCode;
        match self {
            IssueError::Memory => ErrorCode::ENOMEM,
            IssueError::Argument => ErrorCode::EINVAL,
            IssueError::Capacity => ErrorCode::ENOMEM,
            IssueError::Platform(code) => code,
        }
    }
}

/// Why a promise resolved without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseFailure {
    TimedOut,
    TooManyPending,
    Other(i32),
}

impl PromiseFailure {
    /// Map to the wire error-code taxonomy, per spec §4.6 step 4.
    pub fn as_error_code(self) -> i32 {
        use ocvsmd_wire::ErrorCode;
        match self {
            PromiseFailure::TimedOut => ErrorCode::ETIMEDOUT,
            PromiseFailure::TooManyPending => ErrorCode::EBUSY,
            PromiseFailure::Other(code) => code,
        }
    }
}

/// A one-shot handle to a service response in flight. Dropping it before
/// resolution cancels the outstanding request (spec §5 "their destructors
/// cancel the outstanding service request").
pub struct ResponsePromise<Response> {
    receiver: oneshot::Receiver<Result<Response, PromiseFailure>>,
    /// Kept alive only so the cancellation side-channel stays open until
    /// this promise (or its request) is dropped; never read directly.
    _cancel_on_drop: Option<oneshot::Sender<()>>,
}

impl<Response> ResponsePromise<Response> {
    pub fn new(
        receiver: oneshot::Receiver<Result<Response, PromiseFailure>>,
        cancel_on_drop: oneshot::Sender<()>,
    ) -> Self {
        ResponsePromise {
            receiver,
            _cancel_on_drop: Some(cancel_on_drop),
        }
    }

    /// Await the response. Resolves to `Err` if the promise was dropped on
    /// the producing side without ever completing (treated the same as an
    /// upstream failure by callers).
    pub async fn wait(self) -> Result<Response, PromiseFailure> {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => Err(PromiseFailure::Other(ocvsmd_wire::ErrorCode::ESHUTDOWN)),
        }
    }
}

/// A Cyphal service client bound to one remote node-id.
pub trait ServiceClient<S: Service> {
    /// Issue a request with the given per-call timeout, returning a promise
    /// for its response. Fails if the request could not be issued at all
    /// (distinct from the promise later resolving to a [`PromiseFailure`]).
    fn request(
        &mut self,
        request: S::Request,
        timeout: Duration,
    ) -> Result<ResponsePromise<S::Response>, IssueError>;
}

/// The capability the daemon consumes to talk to remote Cyphal nodes,
/// parameterized by the service it constructs clients for. Implementations
/// own the underlying transport and DSDL serialization; this crate only
/// describes the shape the daemon's FSMs program against. A presentation
/// layer supporting several services implements this trait once per
/// [`Service`] type it knows how to resolve.
pub trait Presentation<S: Service> {
    type Client: ServiceClient<S>;

    fn make_client(&self, node_id: u16) -> Result<Self::Client, MakeClientError>;
}
