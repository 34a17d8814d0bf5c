//! tabbus — a cross-context event bus.
//!
//! One application instance often spans several execution contexts:
//! browser-style tabs and windows of the same origin plus a background
//! worker. This crate gives each context an [`EventBus`] that behaves
//! consistently across three distances:
//!
//! - **in-process**: synchronous pub/sub in listener-registration
//!   order;
//! - **cross-tab**: JSON envelopes over a reply-less broadcast
//!   transport, unordered, best-effort;
//! - **worker ↔ pages**: the same wire protocol over per-client port
//!   fan-out.
//!
//! On top of raw pub/sub the bus layers:
//!
//! - one-slot replay of the most recent emission per event per scope,
//!   so late subscribers with `immediate` still observe state-like
//!   events;
//! - a request/response correlation protocol over the broadcast
//!   transport ([`EventBus::cross_tab_request`] /
//!   [`EventBus::add_request_handler`]);
//! - tab-activity tracking fed by window focus/visibility signals and
//!   announced to peers on `tab:uuid`;
//! - an await-style fan-out ([`EventBus::await_all`]) that resolves
//!   only once every interested listener, local and in other tabs,
//!   has finished reacting — what a worker needs to extend its own
//!   lifetime until all pages have processed an event;
//! - deterministic leader election ([`EventBus::get_active_tabs`] /
//!   [`EventBus::is_main`]) so singleton work such as an auth token
//!   refresh runs in exactly one tab.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use tabbus::transport::MemoryHub;
//! use tabbus::{callback, EmitOptions, EventBus, ListenOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = MemoryHub::new("example");
//! let tab_a = EventBus::with_channel(Arc::new(hub.attach()));
//! let tab_b = EventBus::with_channel(Arc::new(hub.attach()));
//!
//! tab_b.on(
//!     "identity:login",
//!     callback(|args, from| {
//!         println!("login {:?} announced by {:?}", args, from);
//!     }),
//!     ListenOptions::new().cross_tab(true),
//! );
//!
//! tab_a.emit(
//!     "identity:login",
//!     EmitOptions::everywhere(),
//!     vec![json!("token123")],
//! );
//! # }
//! ```

pub mod activity;
pub mod boot;
pub mod bus;
pub mod constants;
pub mod emitter;
pub mod error;
pub mod events;
pub mod ident;
pub mod request;
pub mod transport;
pub mod watch;
pub mod wire;

pub use activity::ActivitySignal;
pub use boot::{AppContext, BootFlag, BootState, BOOT_EVENTS};
pub use bus::{EmitOptions, EventBus, ListenOptions};
pub use emitter::{async_callback, callback, AsyncCallback, Callback};
pub use error::BusError;
pub use request::{request_handler, RequestHandler, Targets};
pub use watch::Watchable;
pub use wire::Envelope;
