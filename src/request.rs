//! Request/response correlation over a reply-less broadcast transport.
//!
//! A broadcast channel has no return path: a post reaches every other
//! context, and none of them can address a reply to the sender. This
//! module layers a correlation protocol on top:
//!
//! ```text
//! Caller                         Peer contexts
//!   │  crossTabRequest                  │
//!   │  [id, method, payload, targets]   │
//!   │──────────────────────────────────>│ addressed? look up method,
//!   │                                   │ run handler
//!   │  crossTabResponse [id, response]  │
//!   │<──────────────────────────────────│
//!   │  (collect until timeout,          │
//!   │   then tear down id)              │
//! ```
//!
//! Responses arriving after the timeout find no pending entry and are
//! discarded; the round degrades silently into fewer responses than
//! expected, which callers must treat as a valid outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::BusError;

/// Built-in method answering with the responder's `active` flag.
pub const METHOD_GET_ACTIVE_TABS: &str = "getActiveTabs";

/// Built-in method running local listeners for an event and responding
/// once they have all settled.
pub const METHOD_AWAIT_CROSS_TAB: &str = "awaitCrossTab";

/// Method names the bus itself relies on; registering over them fails.
pub const PROTECTED_METHODS: [&str; 2] = [METHOD_GET_ACTIVE_TABS, METHOD_AWAIT_CROSS_TAB];

/// A named request handler.
///
/// Handlers are uniformly async; a failing handler is logged at the
/// dispatch site and answered with `null` rather than aborting the round.
pub type RequestHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`RequestHandler`].
pub fn request_handler<F, Fut>(f: F) -> RequestHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

/// Addressing of a request round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Targets {
    /// Every context on the channel; serializes as the string `"*"`.
    All(AllMarker),
    /// Only the listed context uuids.
    Some(Vec<String>),
}

/// Serde marker restricting [`Targets::All`] to the literal `"*"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllMarker {
    /// The `"*"` wildcard.
    #[serde(rename = "*")]
    Star,
}

impl Targets {
    /// The wildcard addressing every context.
    pub fn all() -> Self {
        Self::All(AllMarker::Star)
    }

    /// Address only the given uuids.
    pub fn only(uuids: Vec<String>) -> Self {
        Self::Some(uuids)
    }

    /// Whether a context with `uuid` should answer.
    pub fn includes(&self, uuid: &str) -> bool {
        match self {
            Self::All(_) => true,
            Self::Some(uuids) => uuids.iter().any(|u| u == uuid),
        }
    }
}

impl Default for Targets {
    fn default() -> Self {
        Self::all()
    }
}

/// Decoded `crossTabRequest` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    /// Correlation id, fresh per round.
    pub id: String,
    /// Handler name to invoke on addressed contexts.
    pub method: String,
    /// Opaque payload forwarded to the handler.
    pub payload: Value,
    /// Which contexts should answer.
    pub targets: Targets,
}

impl RequestFrame {
    /// Encode as the `args` array of a `crossTabRequest` envelope.
    pub fn into_args(self) -> Result<Vec<Value>, BusError> {
        Ok(vec![
            Value::String(self.id),
            Value::String(self.method),
            self.payload,
            serde_json::to_value(self.targets)?,
        ])
    }

    /// Decode from the `args` array of a `crossTabRequest` envelope.
    /// Returns `None` for malformed frames.
    pub fn from_args(args: &[Value]) -> Option<Self> {
        let [id, method, payload, targets] = args else {
            return None;
        };
        Some(Self {
            id: id.as_str()?.to_string(),
            method: method.as_str()?.to_string(),
            payload: payload.clone(),
            targets: serde_json::from_value(targets.clone()).ok()?,
        })
    }
}

/// Decoded `crossTabResponse` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    /// Correlation id the response belongs to.
    pub id: String,
    /// The handler's result; `null` when the handler failed or was
    /// missing.
    pub response: Value,
}

impl ResponseFrame {
    /// Encode as the `args` array of a `crossTabResponse` envelope.
    pub fn into_args(self) -> Vec<Value> {
        vec![Value::String(self.id), self.response]
    }

    /// Decode from the `args` array of a `crossTabResponse` envelope.
    pub fn from_args(args: &[Value]) -> Option<Self> {
        let [id, response] = args else {
            return None;
        };
        Some(Self {
            id: id.as_str()?.to_string(),
            response: response.clone(),
        })
    }
}

/// Payload of the built-in `awaitCrossTab` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitPayload {
    /// Event whose local listeners should be driven to completion.
    pub event: String,
    /// Arguments passed to those listeners.
    pub args: Vec<Value>,
}

/// Named handler table, one per bus instance.
#[derive(Default)]
pub(crate) struct HandlerTable {
    map: Mutex<HashMap<String, RequestHandler>>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.map.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("HandlerTable")
            .field("methods", &guard.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerTable {
    /// Register an application handler. Protected names are rejected.
    pub fn register(&self, method: &str, handler: RequestHandler) -> Result<(), BusError> {
        if PROTECTED_METHODS.contains(&method) {
            return Err(BusError::ProtectedMethod(method.to_string()));
        }
        self.insert(method, handler);
        Ok(())
    }

    /// Register a built-in handler, bypassing the protected-name check.
    pub fn register_builtin(&self, method: &str, handler: RequestHandler) {
        self.insert(method, handler);
    }

    fn insert(&self, method: &str, handler: RequestHandler) {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(method.to_string(), handler);
    }

    /// Look up a handler by method name.
    pub fn get(&self, method: &str) -> Option<RequestHandler> {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(method)
            .map(Arc::clone)
    }
}

/// Correlation ids awaiting responses.
///
/// At most one live entry per id; closing an id discards anything that
/// arrives afterwards.
#[derive(Default)]
pub(crate) struct PendingRequests {
    map: Mutex<HashMap<String, mpsc::UnboundedSender<(String, Value)>>>,
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.map.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("PendingRequests")
            .field("open", &guard.len())
            .finish()
    }
}

impl PendingRequests {
    /// Open a correlation, returning the stream of `(from, response)`
    /// pairs.
    pub fn open(&self, id: &str) -> mpsc::UnboundedReceiver<(String, Value)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), tx);
        rx
    }

    /// Route an inbound response to its correlation, if still open.
    pub fn resolve(&self, id: &str, from: &str, response: Value) {
        let tx = self
            .map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned();
        match tx {
            Some(tx) => {
                let _ = tx.send((from.to_string(), response));
            }
            None => {
                log::debug!("discarding late response to request {} from {}", id, from);
            }
        }
    }

    /// Tear a correlation down.
    pub fn close(&self, id: &str) {
        self.map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}
