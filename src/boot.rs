//! Application boot coordination over the bus.
//!
//! Integrations (local storage, the cron scheduler) announce that they
//! finished or failed loading by emitting a per-flag event locally;
//! an [`AppContext`] listens for those events and folds them into a
//! `booted` flag, plus a `ready` flag that additionally waits for
//! externally supplied dependency states (identity, push).
//!
//! The event names are a fixed table ([`BOOT_EVENTS`]) built once —
//! never derived from flag names at runtime — and all mutable state
//! lives on the context object with explicit [`AppContext::mount`] /
//! [`AppContext::unmount`] hooks rather than in module-level globals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::bus::{EventBus, ListenOptions};
use crate::emitter::{callback, Callback};
use crate::watch::Watchable;

/// An integration tracked during boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootFlag {
    /// The local storage wrapper.
    LocalStorage,
    /// The cron scheduler.
    Cron,
}

/// The event names announcing one flag's outcome.
#[derive(Debug, Clone, Copy)]
pub struct BootEventNames {
    /// The flag these names belong to.
    pub flag: BootFlag,
    /// Emitted locally when the integration loaded.
    pub loaded: &'static str,
    /// Emitted locally when the integration failed to load.
    pub failed: &'static str,
}

/// Static flag → event-name table.
pub static BOOT_EVENTS: [BootEventNames; 2] = [
    BootEventNames {
        flag: BootFlag::LocalStorage,
        loaded: "loaded:localstorage",
        failed: "failed:localstorage",
    },
    BootEventNames {
        flag: BootFlag::Cron,
        loaded: "loaded:cron",
        failed: "failed:cron",
    },
];

impl BootFlag {
    /// Look this flag up in [`BOOT_EVENTS`].
    pub fn event_names(self) -> &'static BootEventNames {
        BOOT_EVENTS
            .iter()
            .find(|names| names.flag == self)
            .unwrap_or(&BOOT_EVENTS[0])
    }
}

/// Outcome of one integration's boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    /// Not announced yet.
    Pending,
    /// Loaded successfully.
    Loaded,
    /// Failed to load. A failed integration does not block `booted` —
    /// the application starts degraded rather than never.
    Failed,
}

struct ContextState {
    states: Mutex<HashMap<BootFlag, BootState>>,
    dependencies: Mutex<Vec<(String, Watchable<bool>)>>,
    subscriptions: Mutex<Vec<(&'static str, Callback)>>,
    mounted: Watchable<bool>,
}

/// Explicit application context owning boot state.
///
/// Create one per application instance, `mount` it when the host shell
/// comes up, and `unmount` it on teardown to release the bus
/// subscriptions it added. Clones share the same state.
#[derive(Clone)]
pub struct AppContext {
    bus: EventBus,
    state: Arc<ContextState>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("mounted", &self.state.mounted.get())
            .field("booted", &self.booted())
            .finish()
    }
}

impl AppContext {
    /// Create a context bound to `bus` with every flag pending.
    pub fn new(bus: EventBus) -> Self {
        let states = BOOT_EVENTS
            .iter()
            .map(|names| (names.flag, BootState::Pending))
            .collect();
        Self {
            bus,
            state: Arc::new(ContextState {
                states: Mutex::new(states),
                dependencies: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                mounted: Watchable::new(false),
            }),
        }
    }

    /// Subscribe to every flag's loaded/failed events and mark the
    /// context mounted.
    ///
    /// Subscriptions use `immediate` replay, so flags announced before
    /// mounting are still observed. Mounting twice stacks no duplicate
    /// subscriptions.
    pub fn mount(&self) {
        if self.state.mounted.get() {
            return;
        }
        let listen = ListenOptions::new().local(true).immediate(true);
        let mut subscriptions = self
            .state
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for names in &BOOT_EVENTS {
            for (event, outcome) in [(names.loaded, BootState::Loaded), (names.failed, BootState::Failed)] {
                let state = Arc::clone(&self.state);
                let flag = names.flag;
                let cb = callback(move |_, _| {
                    state
                        .states
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(flag, outcome);
                });
                self.bus.on(event, Arc::clone(&cb), listen);
                subscriptions.push((event, cb));
            }
        }
        drop(subscriptions);
        self.state.mounted.set(true);
    }

    /// Remove the subscriptions added by [`AppContext::mount`] and mark
    /// the context unmounted.
    pub fn unmount(&self) {
        let mut subscriptions = self
            .state
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for (event, cb) in subscriptions.drain(..) {
            self.bus.off(event, &cb, ListenOptions::new().local(true));
        }
        drop(subscriptions);
        self.state.mounted.set(false);
    }

    /// Announce that an integration loaded.
    pub fn mark_loaded(&self, flag: BootFlag) {
        self.bus.emit(
            flag.event_names().loaded,
            crate::bus::EmitOptions::local_only(),
            vec![],
        );
    }

    /// Announce that an integration failed to load.
    pub fn mark_failed(&self, flag: BootFlag) {
        self.bus.emit(
            flag.event_names().failed,
            crate::bus::EmitOptions::local_only(),
            vec![],
        );
    }

    /// Track an external dependency (e.g. identity or push boot state)
    /// that `ready` should wait for.
    pub fn add_dependency(&self, name: impl Into<String>, state: Watchable<bool>) {
        self.state
            .dependencies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.into(), state));
    }

    /// Whether every tracked flag has announced an outcome (loaded or
    /// failed).
    pub fn booted(&self) -> bool {
        self.state
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .all(|state| *state != BootState::Pending)
    }

    /// Whether the application is booted and every registered
    /// dependency reports true.
    pub fn ready(&self) -> bool {
        self.booted()
            && self
                .state
                .dependencies
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .all(|(_, dep)| dep.get())
    }

    /// Whether [`AppContext::mount`] has run.
    pub fn mounted(&self) -> bool {
        self.state.mounted.get()
    }

    /// Current state of one flag.
    pub fn state_of(&self, flag: BootFlag) -> BootState {
        self.state
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&flag)
            .copied()
            .unwrap_or(BootState::Pending)
    }
}
