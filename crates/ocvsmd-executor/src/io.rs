//! I/O-readiness callbacks, backed by tokio's epoll/kqueue reactor via
//! [`tokio::io::unix::AsyncFd`].
//!
//! Spec: §4.2 "I/O-readiness (fires when a file descriptor becomes
//! readable or writable)".

use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

/// Which direction(s) became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

/// A raw fd wrapper used purely for readiness polling. The executor never
/// reads or writes through it; ownership of the underlying socket stays
/// with the component that registered it (the stream pipe).
struct BorrowedRawFd(RawFd);

impl AsRawFd for BorrowedRawFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

pub(crate) struct IoWatcher {
    afd: AsyncFd<BorrowedRawFd>,
    callback: Box<dyn FnMut(Readiness)>,
}

pub(crate) struct IoTable {
    watchers: HashMap<u64, IoWatcher>,
    next_id: u64,
}

impl IoTable {
    pub(crate) fn new() -> Self {
        IoTable {
            watchers: HashMap::new(),
            next_id: 0,
        }
    }

    pub(crate) fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        callback: Box<dyn FnMut(Readiness)>,
    ) -> std::io::Result<u64> {
        let afd = AsyncFd::with_interest(BorrowedRawFd(fd), interest)?;
        let id = self.next_id;
        self.next_id += 1;
        self.watchers.insert(id, IoWatcher { afd, callback });
        Ok(id)
    }

    pub(crate) fn unregister(&mut self, id: u64) {
        self.watchers.remove(&id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Block (on the current-thread runtime) until any registered fd
    /// becomes ready or `timeout` elapses, then invoke matching callbacks.
    ///
    /// Returns `true` if at least one callback fired.
    pub(crate) async fn poll_for(&mut self, timeout: Duration) -> bool {
        if self.watchers.is_empty() {
            tokio::time::sleep(timeout).await;
            return false;
        }

        let ids: Vec<u64> = self.watchers.keys().copied().collect();
        let mut ready_ids: Vec<(u64, Readiness)> = Vec::new();

        let wait = async {
            let mut futs = Vec::with_capacity(ids.len());
            for &id in &ids {
                let watcher = self.watchers.get(&id).expect("watcher present");
                futs.push(Box::pin(async move {
                    let guard = watcher.afd.ready(Interest::READABLE | Interest::WRITABLE).await;
                    (id, guard)
                }));
            }
            let ((id, guard), _idx, _rest) = futures_util::future::select_all(futs).await;
            if let Ok(guard) = guard {
                let readiness = Readiness {
                    readable: guard.ready().is_readable(),
                    writable: guard.ready().is_writable(),
                };
                guard.clear_ready();
                ready_ids.push((id, readiness));
            }
        };

        tokio::select! {
            _ = wait => {}
            _ = tokio::time::sleep(timeout) => {
                return false;
            }
        }

        let fired = !ready_ids.is_empty();
        for (id, readiness) in ready_ids {
            if let Some(watcher) = self.watchers.get_mut(&id) {
                (watcher.callback)(readiness);
            }
        }
        fired
    }
}
