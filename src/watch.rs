//! Plain observable value primitive.
//!
//! The original design leaned on a UI framework's reactive refs for the
//! `active` flag and boot-state tracking. The contract that actually
//! matters is "readable now, observable on change", so this module
//! provides a listener-list-backed cell instead of a reactivity engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type WatchFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct WatchInner<T> {
    value: Mutex<T>,
    subscribers: Mutex<Vec<(u64, WatchFn<T>)>>,
    next_id: AtomicU64,
}

/// A shareable value cell that notifies subscribers when the value
/// changes.
///
/// Clones share the same underlying cell. Notifications run
/// synchronously on the thread that called [`Watchable::set`], in
/// subscription order. A subscriber that needs to do real work should
/// queue it rather than block the setter.
pub struct Watchable<T> {
    inner: Arc<WatchInner<T>>,
}

impl<T> Clone for Watchable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Watchable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchable")
            .field("value", &*self.inner.value.lock().unwrap_or_else(|e| e.into_inner()))
            .finish()
    }
}

impl<T: Clone + PartialEq> Watchable<T> {
    /// Create a new cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(WatchInner {
                value: Mutex::new(value),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Read the current value.
    pub fn get(&self) -> T {
        self.inner
            .value
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        let changed = {
            let mut guard = self.inner.value.lock().unwrap_or_else(|e| e.into_inner());
            if *guard == value {
                false
            } else {
                *guard = value;
                true
            }
        };
        if changed {
            let value = self.get();
            let subscribers: Vec<WatchFn<T>> = self
                .inner
                .subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|(_, f)| Arc::clone(f))
                .collect();
            for subscriber in subscribers {
                subscriber(&value);
            }
        }
    }

    /// Subscribe to changes. Returns an id usable with
    /// [`Watchable::unsubscribe`].
    pub fn subscribe<F>(&self, f: F) -> u64
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(f)));
        id
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: u64) {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(sid, _)| *sid != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_get_set() {
        let w = Watchable::new(1);
        assert_eq!(w.get(), 1);
        w.set(2);
        assert_eq!(w.get(), 2);
    }

    #[test]
    fn test_notifies_on_change_only() {
        let w = Watchable::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        w.subscribe(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        w.set(0); // unchanged, no notification
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        w.set(5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        w.set(5); // unchanged again
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let w = Watchable::new(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let id = w.subscribe(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        w.unsubscribe(id);
        w.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // removing again is harmless
        w.unsubscribe(id);
    }

    #[test]
    fn test_clones_share_state() {
        let a = Watchable::new(String::from("x"));
        let b = a.clone();
        b.set(String::from("y"));
        assert_eq!(a.get(), "y");
    }
}
