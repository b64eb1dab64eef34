//! Per-descriptor issue order for deferred operations.
//!
//! A turn is reserved on the calling thread, before the operation is spawned.
//! Each turn waits for the previous turn on the same descriptor to be dropped,
//! so operations complete in the order they were issued no matter which
//! worker thread picks them up.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tern_host::Fd;
use tokio::sync::oneshot;

struct Tail {
    seq: u64,
    released: oneshot::Receiver<()>,
}

#[derive(Default)]
pub(crate) struct FdTurns {
    tails: Mutex<HashMap<Fd, Tail>>,
    next_seq: AtomicU64,
}

/// A reserved slot in a descriptor's queue. Dropping it lets the next one run.
pub(crate) struct Turn {
    fd: Fd,
    seq: u64,
    prev: Option<oneshot::Receiver<()>>,
    _release: oneshot::Sender<()>,
}

impl FdTurns {
    pub(crate) fn reserve(&self, fd: Fd) -> Turn {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let prev = self
            .tails
            .lock()
            .insert(fd, Tail { seq, released: rx })
            .map(|tail| tail.released);
        Turn {
            fd,
            seq,
            prev,
            _release: tx,
        }
    }

    /// Drop the queue entry for `fd` if `turn` is still its last reservation.
    pub(crate) fn forget(&self, turn: &Turn) {
        let mut tails = self.tails.lock();
        if tails.get(&turn.fd).is_some_and(|tail| tail.seq == turn.seq) {
            tails.remove(&turn.fd);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tails.lock().len()
    }
}

impl Turn {
    /// Wait until every earlier turn on this descriptor has been dropped.
    pub(crate) async fn ready(&mut self) {
        if let Some(prev) = self.prev.take() {
            // A dropped sender is the release signal.
            let _ = prev.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn turns_release_in_reservation_order() {
        let turns = FdTurns::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..64 {
            let mut turn = turns.reserve(7);
            let seen = seen.clone();
            handles.push(tokio::spawn(async move {
                turn.ready().await;
                if i % 3 == 0 {
                    tokio::task::yield_now().await;
                }
                seen.lock().push(i);
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(*seen.lock(), (0..64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn forget_only_clears_the_last_reservation() {
        let turns = FdTurns::default();
        let first = turns.reserve(3);
        let second = turns.reserve(3);
        turns.forget(&first);
        assert_eq!(turns.len(), 1);
        turns.forget(&second);
        assert_eq!(turns.len(), 0);
    }

    #[tokio::test]
    async fn descriptors_do_not_wait_on_each_other() {
        let turns = FdTurns::default();
        let _held = turns.reserve(3);
        let mut other = turns.reserve(4);
        tokio::time::timeout(std::time::Duration::from_secs(1), other.ready())
            .await
            .expect("independent descriptor");
    }
}
