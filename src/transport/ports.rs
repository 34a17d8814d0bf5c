//! Port-based broadcast for worker-style topologies.
//!
//! A background worker context has no broadcast channel shared with its
//! page clients; it reaches them by posting to each client port
//! individually, and clients post back to the worker the same way.
//! [`PortHub`] models that star topology: every attached
//! [`PortBroadcast`] owns one port, and a post on any port fans out to
//! all other ports. The bus protocol on top is identical to the
//! broadcast-channel case, which is the point — a worker-hosted bus and
//! a tab-hosted bus speak the same wire format over different plumbing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Broadcast, BroadcastReceiver, ClosedInbound, Inbound};
use crate::error::BusError;

#[derive(Debug, Default)]
struct PortTable {
    ports: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

/// A star-topology message router handing out per-context ports.
#[derive(Debug)]
pub struct PortHub {
    name: String,
    table: Arc<PortTable>,
}

impl PortHub {
    /// Create a hub for the given channel name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: Arc::new(PortTable::default()),
        }
    }

    /// Attach a new context, allocating its port.
    pub fn attach(&self) -> PortBroadcast {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.table
            .ports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        PortBroadcast {
            name: self.name.clone(),
            table: Arc::clone(&self.table),
            id,
            rx: Mutex::new(Some(rx)),
        }
    }
}

/// One context's port on a [`PortHub`].
#[derive(Debug)]
pub struct PortBroadcast {
    name: String,
    table: Arc<PortTable>,
    id: u64,
    rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Drop for PortBroadcast {
    fn drop(&mut self) {
        self.table
            .ports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

#[async_trait]
impl Broadcast for PortBroadcast {
    async fn post(&self, raw: String) -> Result<(), BusError> {
        let targets: Vec<mpsc::UnboundedSender<String>> = {
            let ports = self.table.ports.lock().unwrap_or_else(|e| e.into_inner());
            ports
                .iter()
                .filter(|(id, _)| **id != self.id)
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        for tx in targets {
            // a closed port just means that context is gone
            let _ = tx.send(raw.clone());
        }
        Ok(())
    }

    fn subscribe(&self) -> BroadcastReceiver {
        let taken = self
            .rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match taken {
            Some(rx) => Box::new(PortInbound { rx }),
            None => {
                log::warn!(
                    "port on channel \"{}\" subscribed twice; returning a closed stream",
                    self.name
                );
                Box::new(ClosedInbound)
            }
        }
    }

    fn channel_name(&self) -> &str {
        &self.name
    }
}

struct PortInbound {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Inbound for PortInbound {
    async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
