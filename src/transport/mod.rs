//! Broadcast transport abstraction.
//!
//! A broadcast transport is a same-origin, multi-context publish
//! mechanism with no built-in reply channel: any context can post, every
//! *other* attached context receives. The bus layers its replay,
//! request/response and await semantics on top of this minimal contract,
//! so the same `EventBus` works over any implementation:
//!
//! ```text
//! Broadcast (trait)
//!     │
//!     ├── MemoryBroadcast (memory.rs)
//!     │   └── named in-process hub, BroadcastChannel analogue
//!     │
//!     └── PortBroadcast (ports.rs)
//!         └── per-client port fan-out, worker postMessage analogue
//! ```
//!
//! Delivery order across contexts is whatever the underlying mechanism
//! provides; the bus neither reorders nor buffers. Drops are possible
//! and unhandled.

pub mod memory;
pub mod ports;

use async_trait::async_trait;

use crate::error::BusError;

pub use memory::{MemoryBroadcast, MemoryHub};
pub use ports::{PortBroadcast, PortHub};

/// Inbound half of a transport attachment.
#[async_trait]
pub trait Inbound: Send {
    /// Receive the next raw message, or `None` once the transport is
    /// closed. A handle's own posts are never delivered back to it.
    async fn recv(&mut self) -> Option<String>;
}

/// Boxed inbound stream handed to the bus pump.
pub type BroadcastReceiver = Box<dyn Inbound>;

/// One context's attachment to a broadcast channel.
#[async_trait]
pub trait Broadcast: Send + Sync {
    /// Publish a raw message to every other context on the channel.
    async fn post(&self, raw: String) -> Result<(), BusError>;

    /// Open the inbound message stream for this attachment.
    ///
    /// Implementations may hand out the stream only once; subsequent
    /// calls yield an immediately-closed receiver.
    fn subscribe(&self) -> BroadcastReceiver;

    /// Name of the channel this attachment belongs to.
    fn channel_name(&self) -> &str;
}

/// An inbound stream that is already closed.
///
/// Used by transports whose real stream has been claimed.
#[derive(Debug, Default)]
pub struct ClosedInbound;

#[async_trait]
impl Inbound for ClosedInbound {
    async fn recv(&mut self) -> Option<String> {
        None
    }
}
