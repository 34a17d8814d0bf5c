//! Listener registry underlying each dispatch scope of the bus.
//!
//! An [`Emitter`] owns the listener lists for one scope (local or
//! cross-tab). Dispatch is synchronous and runs in registration order.
//! Listeners come in two flavors:
//!
//! - synchronous callbacks, invoked inline;
//! - asynchronous callbacks, which hand back a future. On a plain
//!   [`Emitter::emit`] that future is spawned fire-and-forget; during an
//!   await-style fan-out ([`Emitter::dispatch_collect`]) the futures are
//!   returned to the caller so it can wait for all of them to settle.
//!
//! Removal is by callback identity (`Arc::ptr_eq`), so callers keep the
//! `Arc` they registered if they intend to unregister later. Removing a
//! callback that was never registered is a silent no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde_json::Value;

/// A synchronous event listener.
///
/// Receives the emission's arguments plus the originating context's uuid
/// (`None` for local emissions and replayed calls).
pub type Callback = Arc<dyn Fn(&[Value], Option<&str>) + Send + Sync>;

/// An asynchronous event listener.
///
/// Returns a future that the bus either spawns (plain emit) or awaits
/// (await-style fan-out).
pub type AsyncCallback =
    Arc<dyn Fn(Vec<Value>, Option<String>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&[Value], Option<&str>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as an [`AsyncCallback`].
pub fn async_callback<F, Fut>(f: F) -> AsyncCallback
where
    F: Fn(Vec<Value>, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |args, from| Box::pin(f(args, from)))
}

#[derive(Clone)]
enum Listener {
    Sync(Callback),
    Async(AsyncCallback),
}

#[derive(Clone)]
struct Entry {
    listener: Listener,
    once: bool,
}

/// Listener registry for one dispatch scope.
#[derive(Default)]
pub struct Emitter {
    listeners: Mutex<HashMap<String, Vec<Entry>>>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("Emitter")
            .field("event_count", &guard.len())
            .field(
                "listener_count",
                &guard.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl Emitter {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: &str, listener: Listener, once: bool) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event.to_string())
            .or_default()
            .push(Entry { listener, once });
    }

    /// Register a synchronous listener.
    pub fn on(&self, event: &str, cb: Callback) {
        self.push(event, Listener::Sync(cb), false);
    }

    /// Register an asynchronous listener.
    pub fn on_async(&self, event: &str, cb: AsyncCallback) {
        self.push(event, Listener::Async(cb), false);
    }

    /// Register a synchronous listener removed after its first firing.
    pub fn once(&self, event: &str, cb: Callback) {
        self.push(event, Listener::Sync(cb), true);
    }

    /// Register an asynchronous listener removed after its first firing.
    pub fn once_async(&self, event: &str, cb: AsyncCallback) {
        self.push(event, Listener::Async(cb), true);
    }

    /// Remove a synchronous listener by identity. Unknown callbacks are a
    /// no-op.
    pub fn off(&self, event: &str, cb: &Callback) {
        let mut guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = guard.get_mut(event) {
            entries.retain(|e| match &e.listener {
                Listener::Sync(registered) => !Arc::ptr_eq(registered, cb),
                Listener::Async(_) => true,
            });
            if entries.is_empty() {
                guard.remove(event);
            }
        }
    }

    /// Remove an asynchronous listener by identity. Unknown callbacks are
    /// a no-op.
    pub fn off_async(&self, event: &str, cb: &AsyncCallback) {
        let mut guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entries) = guard.get_mut(event) {
            entries.retain(|e| match &e.listener {
                Listener::Async(registered) => !Arc::ptr_eq(registered, cb),
                Listener::Sync(_) => true,
            });
            if entries.is_empty() {
                guard.remove(event);
            }
        }
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Snapshot the listeners for `event`, dropping `once` entries from
    /// the registry. Dispatch happens outside the lock.
    fn take_snapshot(&self, event: &str) -> Vec<Entry> {
        let mut guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        match guard.get_mut(event) {
            Some(entries) => {
                let snapshot = entries.clone();
                entries.retain(|e| !e.once);
                if entries.is_empty() {
                    guard.remove(event);
                }
                snapshot
            }
            None => Vec::new(),
        }
    }

    /// Dispatch an emission: synchronous listeners run inline in
    /// registration order, asynchronous listeners are spawned
    /// fire-and-forget.
    ///
    /// Must be called from within a tokio runtime if any asynchronous
    /// listeners are registered for `event`.
    pub fn emit(&self, event: &str, args: &[Value], from: Option<&str>) {
        for entry in self.take_snapshot(event) {
            match entry.listener {
                Listener::Sync(cb) => cb(args, from),
                Listener::Async(cb) => {
                    tokio::spawn(cb(args.to_vec(), from.map(str::to_string)));
                }
            }
        }
    }

    /// Dispatch an emission and return the futures produced by
    /// asynchronous listeners instead of spawning them.
    ///
    /// Synchronous listeners still run inline (their work has settled by
    /// the time this returns). `once` listeners are consumed exactly as
    /// with [`Emitter::emit`].
    pub fn dispatch_collect(
        &self,
        event: &str,
        args: &[Value],
        from: Option<&str>,
    ) -> Vec<BoxFuture<'static, ()>> {
        let mut futures = Vec::new();
        for entry in self.take_snapshot(event) {
            match entry.listener {
                Listener::Sync(cb) => cb(args, from),
                Listener::Async(cb) => {
                    futures.push(cb(args.to_vec(), from.map(str::to_string)));
                }
            }
        }
        futures
    }
}
