//! Channel events and the handler trait a service factory or SDK caller
//! implements to receive them.
//!
//! Spec: §4.4, §9 "Opaque polymorphism" — handlers are modelled as a
//! single-method trait (a type-erased closure, not an inheritance tree),
//! matching the `Handler` trait in the dispatch registry this crate is
//! grounded on.

/// One event in a channel's lifetime. Every channel's handler observes
/// exactly the sequence `Connected Input* Completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Input(Vec<u8>),
    Completed(i32),
}

/// Receives the event stream for one channel.
pub trait ChannelHandler {
    fn on_event(&mut self, event: ChannelEvent);
}

impl<F> ChannelHandler for F
where
    F: FnMut(ChannelEvent) + 'static,
{
    fn on_event(&mut self, event: ChannelEvent) {
        self(event)
    }
}
