//! Error types for the tabbus crate.

use thiserror::Error;

/// Errors surfaced by the bus and its transports.
///
/// Degraded outcomes that the protocol tolerates by design (malformed
/// inbound payloads, request timeouts with partial responses, removing a
/// listener that was never registered) are *not* errors and never appear
/// here.
#[derive(Debug, Error)]
pub enum BusError {
    /// A cross-tab operation was attempted on a bus constructed without a
    /// broadcast transport (e.g. in a server-rendering context).
    #[error("broadcast channel is not available in this context")]
    ChannelUnavailable,

    /// An attempt was made to register a request handler under a name the
    /// bus itself relies on.
    #[error("request method \"{0}\" is protected and cannot be overridden")]
    ProtectedMethod(String),

    /// The transport rejected an outbound message.
    #[error("transport error: {0}")]
    Transport(String),

    /// An outbound payload could not be serialized to JSON.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
