//! In-process broadcast hub.
//!
//! [`MemoryHub`] is the BroadcastChannel analogue: a named rendezvous
//! point that hands out per-context [`MemoryBroadcast`] attachments.
//! Posting on one attachment delivers to every other attachment on the
//! same hub, never back to the poster. This is both the transport for
//! multiple bus-holding contexts co-located in one process and the
//! harness for multi-context integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Broadcast, BroadcastReceiver, Inbound};
use crate::constants::MEMORY_CHANNEL_CAPACITY;
use crate::error::BusError;

#[derive(Debug, Clone)]
struct Tagged {
    sender: u64,
    raw: Arc<String>,
}

/// A named in-process broadcast channel.
#[derive(Debug)]
pub struct MemoryHub {
    name: String,
    tx: broadcast::Sender<Tagged>,
    next_handle: AtomicU64,
}

impl MemoryHub {
    /// Create a hub for the given channel name.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(MEMORY_CHANNEL_CAPACITY);
        Arc::new(Self {
            name: name.into(),
            tx,
            next_handle: AtomicU64::new(0),
        })
    }

    /// Attach a new context to the hub.
    pub fn attach(self: &Arc<Self>) -> MemoryBroadcast {
        let handle_id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        MemoryBroadcast {
            hub: Arc::clone(self),
            handle_id,
        }
    }
}

/// One context's attachment to a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryBroadcast {
    hub: Arc<MemoryHub>,
    handle_id: u64,
}

#[async_trait]
impl Broadcast for MemoryBroadcast {
    async fn post(&self, raw: String) -> Result<(), BusError> {
        // send fails only when no receiver exists, which just means
        // nobody is listening yet; that is not an error for broadcast.
        let _ = self.hub.tx.send(Tagged {
            sender: self.handle_id,
            raw: Arc::new(raw),
        });
        Ok(())
    }

    fn subscribe(&self) -> BroadcastReceiver {
        Box::new(MemoryInbound {
            rx: self.hub.tx.subscribe(),
            own_handle: self.handle_id,
            channel: self.hub.name.clone(),
        })
    }

    fn channel_name(&self) -> &str {
        &self.hub.name
    }
}

struct MemoryInbound {
    rx: broadcast::Receiver<Tagged>,
    own_handle: u64,
    channel: String,
}

#[async_trait]
impl Inbound for MemoryInbound {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(tagged) if tagged.sender == self.own_handle => continue,
                Ok(tagged) => return Some(tagged.raw.as_ref().clone()),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!(
                        "memory channel \"{}\" dropped {} message(s) for a slow subscriber",
                        self.channel,
                        missed
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
