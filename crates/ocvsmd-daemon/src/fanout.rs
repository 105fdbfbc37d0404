//! The per-node Cyphal fan-out skeleton shared by Execute-Command and the
//! other services that dispatch to multiple remote nodes.
//!
//! Spec: §4.6 "All other services ... follow the same skeleton: parse
//! request, possibly fan out to Cyphal, stream partial results as channel
//! `Input`s, finalize with `ChannelEnd`."

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use ocvsmd_presentation::{Presentation, Service, ServiceClient};
use ocvsmd_router::Gateway;

/// Dedupe `node_ids`, make a client and issue a request against each via
/// `presentation`, then stream a per-node `Input` for every successful
/// response (via `encode_response`) and `complete(0)` once every promise
/// has resolved one way or another.
///
/// A `make_client` failure for any node cancels the whole fan-out: issued
/// promises are dropped (cancelling them) and the channel completes with
/// the translated error code, per §4.6 step 2a.
///
/// Returns the handles of the per-node tasks it spawned so the caller can
/// abort them if the channel is cancelled from the other side before they
/// finish.
pub async fn run_fan_out<S, P>(
    gateway: Gateway,
    presentation: Rc<P>,
    node_ids: Vec<u16>,
    timeout: Duration,
    request_for: impl Fn(u16) -> S::Request,
    encode_response: impl Fn(u16, S::Response) -> Option<Vec<u8>> + 'static,
) -> Vec<tokio::task::JoinHandle<()>>
where
    S: Service + 'static,
    P: Presentation<S> + 'static,
{
    let mut unique: Vec<u16> = node_ids.into_iter().collect::<HashSet<_>>().into_iter().collect();
    unique.sort_unstable();

    if unique.is_empty() {
        gateway.complete(0).await;
        return Vec::new();
    }

    let mut issued = Vec::with_capacity(unique.len());
    for node_id in unique {
        let mut client = match presentation.make_client(node_id) {
            Ok(client) => client,
            Err(err) => {
                warn!(node_id, error = ?err, "fan-out make_client failed, cancelling outstanding promises");
                drop(issued);
                gateway.complete(err.as_error_code()).await;
                return Vec::new();
            }
        };
        let promise = match client.request(request_for(node_id), timeout) {
            Ok(promise) => promise,
            Err(err) => {
                warn!(node_id, error = ?err, "fan-out request issue failed, cancelling outstanding promises");
                drop(issued);
                gateway.complete(err.as_error_code()).await;
                return Vec::new();
            }
        };
        issued.push((node_id, client, promise));
    }

    let outstanding = Rc::new(Cell::new(issued.len()));
    let encode_response = Rc::new(encode_response);

    issued
        .into_iter()
        .map(|(node_id, client, promise)| {
            let gateway = gateway.clone();
            let outstanding = outstanding.clone();
            let encode_response = encode_response.clone();
            tokio::task::spawn_local(async move {
                // Keep the client alive until its promise resolves; dropping
                // it early would cancel the in-flight request.
                let _client = client;
                match promise.wait().await {
                    Ok(response) => {
                        if let Some(bytes) = encode_response(node_id, response) {
                            let _ = gateway.send(bytes).await;
                        }
                    }
                    Err(failure) => {
                        debug!(node_id, error = ?failure, "fan-out node did not complete, dropping its slot");
                    }
                }
                outstanding.set(outstanding.get() - 1);
                if outstanding.get() == 0 {
                    gateway.complete(0).await;
                }
            })
        })
        .collect()
}
