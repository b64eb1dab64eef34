//! Minimal event emitter used by `FileHandle` and the file streams.

use crate::errors::NodeError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tern_host::Fd;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> u64 {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Events raised by file handles and streams.
#[derive(Debug, Clone, PartialEq)]
pub enum FsEvent {
    Open(Fd),
    Ready,
    Data(Bytes),
    End,
    Finish,
    Close,
    Error(NodeError),
}

impl FsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Ready => "ready",
            Self::Data(_) => "data",
            Self::End => "end",
            Self::Finish => "finish",
            Self::Close => "close",
            Self::Error(_) => "error",
        }
    }
}

pub type ListenerFn = Arc<dyn Fn(&FsEvent) + Send + Sync>;

struct Listener {
    id: u64,
    once: bool,
    callback: ListenerFn,
}

/// Listeners keyed by event name, called in registration order.
#[derive(Default)]
pub struct Emitter {
    listeners: Mutex<HashMap<&'static str, Vec<Listener>>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event`; returns an id for [`Emitter::off`].
    pub fn on(&self, event: &'static str, callback: impl Fn(&FsEvent) + Send + Sync + 'static) -> u64 {
        self.add(event, false, Arc::new(callback))
    }

    /// Like [`Emitter::on`], but the listener is removed after its first call.
    pub fn once(
        &self,
        event: &'static str,
        callback: impl Fn(&FsEvent) + Send + Sync + 'static,
    ) -> u64 {
        self.add(event, true, Arc::new(callback))
    }

    fn add(&self, event: &'static str, once: bool, callback: ListenerFn) -> u64 {
        let id = next_listener_id();
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push(Listener { id, once, callback });
        id
    }

    pub fn off(&self, event: &str, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        before != list.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }

    /// Call every listener of the event. Returns whether any listener ran.
    pub fn emit(&self, event: &FsEvent) -> bool {
        // Callbacks run outside the lock so they may register or remove listeners.
        let callbacks: Vec<ListenerFn> = {
            let mut listeners = self.listeners.lock();
            let Some(list) = listeners.get_mut(event.name()) else {
                return false;
            };
            let callbacks = list.iter().map(|l| l.callback.clone()).collect();
            list.retain(|l| !l.once);
            callbacks
        };
        for callback in &callbacks {
            callback(event);
        }
        !callbacks.is_empty()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let counts: HashMap<_, _> = listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Emitter").field("listeners", &counts).finish()
    }
}

/// Collects emitted event names; handy for asserting event order.
#[cfg(test)]
pub(crate) fn record(emitter: &Emitter, events: &[&'static str]) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in events {
        let seen = seen.clone();
        emitter.on(event, move |e| seen.lock().push(e.name()));
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn once_listener_fires_a_single_time() {
        let emitter = Emitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        emitter.once("close", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(emitter.emit(&FsEvent::Close));
        assert!(!emitter.emit(&FsEvent::Close));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_listener() {
        let emitter = Emitter::new();
        let id = emitter.on("end", |_| {});
        assert_eq!(emitter.listener_count("end"), 1);
        assert!(emitter.off("end", id));
        assert!(!emitter.off("end", id));
        assert_eq!(emitter.listener_count("end"), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = Emitter::new();
        let seen = record(&emitter, &["open", "ready"]);
        emitter.emit(&FsEvent::Open(3));
        emitter.emit(&FsEvent::Ready);
        assert_eq!(*seen.lock(), vec!["open", "ready"]);
    }
}
