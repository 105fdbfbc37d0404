//! An in-memory [`Presentation`] used by daemon tests to script per-node
//! outcomes without a real Cyphal transport.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::{IssueError, MakeClientError, PromiseFailure, ResponsePromise, Service, ServiceClient};

/// What a scripted node does when asked for a client, and what its
/// eventual response looks like.
pub enum ScriptedOutcome<S: Service> {
    MakeClientFails(MakeClientError),
    IssueFails(IssueError),
    Responds(S::Response),
    Fails(PromiseFailure),
    /// Never resolves; the promise is dropped by the caller (simulating
    /// cancellation) or the test times out waiting on it.
    Hangs,
}

pub struct MockPresentation<S: Service> {
    scripts: Rc<RefCell<HashMap<u16, ScriptedOutcome<S>>>>,
}

impl<S: Service> Default for MockPresentation<S> {
    fn default() -> Self {
        MockPresentation {
            scripts: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<S: Service> MockPresentation<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, node_id: u16, outcome: ScriptedOutcome<S>) {
        self.scripts.borrow_mut().insert(node_id, outcome);
    }
}

pub struct MockClient<S: Service> {
    node_id: u16,
    scripts: Rc<RefCell<HashMap<u16, ScriptedOutcome<S>>>>,
}

impl<S: Service> ServiceClient<S> for MockClient<S> {
    fn request(
        &mut self,
        _request: S::Request,
        _timeout: Duration,
    ) -> Result<ResponsePromise<S::Response>, IssueError> {
        if let Some(ScriptedOutcome::IssueFails(err)) = self.scripts.borrow().get(&self.node_id) {
            return Err(*err);
        }

        let (tx, rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let outcome = self.scripts.borrow_mut().remove(&self.node_id);
        match outcome {
            Some(ScriptedOutcome::Responds(response)) => {
                let _ = tx.send(Ok(response));
            }
            Some(ScriptedOutcome::Fails(failure)) => {
                let _ = tx.send(Err(failure));
            }
            Some(ScriptedOutcome::Hangs) | None => {
                // Leave `tx` alive only long enough to honor cancellation;
                // spawn nothing, drop it once `cancel_rx` fires or the test
                // drops the promise, whichever happens first.
                tokio::task::spawn_local(async move {
                    let _ = cancel_rx.await;
                    drop(tx);
                });
            }
            Some(ScriptedOutcome::MakeClientFails(_)) => {
                unreachable!("MakeClientFails is handled in make_client, not request")
            }
            Some(ScriptedOutcome::IssueFails(_)) => unreachable!("handled above"),
        }

        Ok(ResponsePromise::new(rx, cancel_tx))
    }
}

impl<S: Service> crate::Presentation<S> for MockPresentation<S> {
    type Client = MockClient<S>;

    fn make_client(&self, node_id: u16) -> Result<Self::Client, MakeClientError> {
        if let Some(ScriptedOutcome::MakeClientFails(err)) = self.scripts.borrow().get(&node_id) {
            return Err(*err);
        }
        Ok(MockClient {
            node_id,
            scripts: self.scripts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService;
    impl Service for TestService {
        type Request = u32;
        type Response = u32;
        const NAME: &'static str = "ocvsmd.test.mock_service";
    }

    #[tokio::test]
    async fn scripted_success_resolves() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let presentation: MockPresentation<TestService> = MockPresentation::new();
                presentation.script(42, ScriptedOutcome::Responds(7));

                let mut client = crate::Presentation::<TestService>::make_client(&presentation, 42).unwrap();
                let promise = client.request(1, Duration::from_secs(1)).unwrap();
                assert_eq!(promise.wait().await, Ok(7));
            })
            .await;
    }

    #[tokio::test]
    async fn scripted_timeout_resolves_as_failure() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let presentation: MockPresentation<TestService> = MockPresentation::new();
                presentation.script(7, ScriptedOutcome::Fails(PromiseFailure::TimedOut));

                let mut client = crate::Presentation::<TestService>::make_client(&presentation, 7).unwrap();
                let promise = client.request(1, Duration::from_secs(1)).unwrap();
                assert_eq!(promise.wait().await, Err(PromiseFailure::TimedOut));
            })
            .await;
    }

    #[tokio::test]
    async fn make_client_failure_is_reported() {
        let presentation: MockPresentation<TestService> = MockPresentation::new();
        presentation.script(9, ScriptedOutcome::MakeClientFails(MakeClientError::Memory));

        let result = crate::Presentation::<TestService>::make_client(&presentation, 9);
        assert_eq!(result.err(), Some(MakeClientError::Memory));
    }

    #[tokio::test]
    async fn issue_failure_is_reported_without_make_client_failing() {
        let presentation: MockPresentation<TestService> = MockPresentation::new();
        presentation.script(11, ScriptedOutcome::IssueFails(IssueError::Capacity));

        let mut client = crate::Presentation::<TestService>::make_client(&presentation, 11).unwrap();
        let result = client.request(1, Duration::from_secs(1));
        assert_eq!(result.err(), Some(IssueError::Capacity));
    }
}
