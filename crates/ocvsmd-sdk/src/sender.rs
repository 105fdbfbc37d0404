//! `Sender`/`sync_wait` and the three accumulation patterns that turn a
//! channel's event stream into a one-shot `Outcome`.
//!
//! Spec: §4.7 "SDK-side service adapter and `Sender`"; §5 "Dropping a
//! sender handle on the SDK side cancels the outbound channel by issuing
//! `ChannelEnd{tag, ECANCELED}`".

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use ocvsmd_router::{ChannelEvent, ChannelHandle};
use ocvsmd_wire::ErrorCode;

/// The result of one service invocation: either its accumulated value or
/// a channel-completion error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure(i32),
}

impl<T> Outcome<T> {
    pub fn ok(self) -> Result<T, i32> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(code) => Err(code),
        }
    }
}

/// A one-shot handle to the result of a submitted service invocation.
/// Dropping it before the channel completes cancels the channel (see
/// module docs).
pub struct Sender<T> {
    result_rx: oneshot::Receiver<T>,
    _cancel_tx: oneshot::Sender<()>,
}

impl<T> Sender<T> {
    pub async fn wait(self) -> T {
        self.result_rx
            .await
            .expect("the accumulator task always resolves its result before exiting")
    }
}

/// Run `future` to completion on a throwaway single-threaded runtime plus
/// `LocalSet`, for call sites with no async context of their own (e.g. a
/// CLI command handler). `future` must do its own connecting and
/// spawning — `submit`'s `spawn_local` call requires the `LocalSet`
/// context this function establishes, so a `Sender` built outside of it
/// cannot be handed in after the fact.
pub fn run_blocking<T: 'static>(future: impl std::future::Future<Output = T> + 'static) -> T {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build a blocking runtime for run_blocking");
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, future)
}

/// Drive `channel`'s event stream through `accumulate` and turn the final
/// state into a `T` via `finish` once `Completed` is observed. Shared by
/// the list/map/unit accumulation patterns below.
fn submit<Acc: 'static, T: 'static>(
    channel: ChannelHandle,
    request: Vec<u8>,
    init: Acc,
    mut accumulate: impl FnMut(&mut Acc, Vec<u8>) + 'static,
    finish: impl FnOnce(Acc, i32) -> T + 'static,
) -> Sender<T> {
    let (result_tx, result_rx) = oneshot::channel::<T>();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ChannelEvent>();

    channel.subscribe(move |event: ChannelEvent| {
        let _ = events_tx.send(event);
    });

    tokio::task::spawn_local(async move {
        let _ = channel.send(request).await;

        let mut acc = init;
        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(ChannelEvent::Connected) => {}
                    Some(ChannelEvent::Input(bytes)) => accumulate(&mut acc, bytes),
                    Some(ChannelEvent::Completed(code)) => {
                        let _ = result_tx.send(finish(acc, code));
                        return;
                    }
                    None => return,
                },
                _ = &mut cancel_rx => {
                    channel.complete(ErrorCode::ECANCELED).await;
                    return;
                }
            }
        }
    });

    Sender { result_rx, _cancel_tx: cancel_tx }
}

/// List-style accumulation: collect every decodable `Input` into a
/// container; `Completed{0}` delivers `Success(items)`, anything else
/// `Failure(code)`.
pub fn submit_list<Item: 'static>(
    channel: ChannelHandle,
    request: Vec<u8>,
    decode_item: impl Fn(&[u8]) -> Option<Item> + 'static,
) -> Sender<Outcome<Vec<Item>>> {
    submit(
        channel,
        request,
        Vec::new(),
        move |items: &mut Vec<Item>, bytes| {
            if let Some(item) = decode_item(&bytes) {
                items.push(item);
            }
        },
        |items, code| {
            if code == 0 {
                Outcome::Success(items)
            } else {
                Outcome::Failure(code)
            }
        },
    )
}

/// Map-style accumulation: collect each `Input` into a `node_id ->
/// response` map. When `partial_results` is true the map is delivered on
/// any completion code (the adapter's contract allows partial results,
/// e.g. Execute-Command); otherwise a non-zero code yields `Failure`.
pub fn submit_map<Item: 'static>(
    channel: ChannelHandle,
    request: Vec<u8>,
    decode_item: impl Fn(&[u8]) -> Option<(u16, Item)> + 'static,
    partial_results: bool,
) -> Sender<Outcome<HashMap<u16, Item>>> {
    submit(
        channel,
        request,
        HashMap::new(),
        move |map: &mut HashMap<u16, Item>, bytes| {
            if let Some((node_id, item)) = decode_item(&bytes) {
                map.insert(node_id, item);
            }
        },
        move |map, code| {
            if code == 0 || partial_results {
                Outcome::Success(map)
            } else {
                Outcome::Failure(code)
            }
        },
    )
}

/// Unit-style accumulation: ignore every `Input`; `Completed{0}` delivers
/// `Success(())`, anything else `Failure(code)`.
pub fn submit_unit(channel: ChannelHandle, request: Vec<u8>) -> Sender<Outcome<()>> {
    submit(
        channel,
        request,
        (),
        |_acc: &mut (), _bytes| {},
        |(), code| {
            if code == 0 {
                Outcome::Success(())
            } else {
                Outcome::Failure(code)
            }
        },
    )
}
