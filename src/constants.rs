//! Crate-wide constants for tabbus.
//!
//! Centralizes the timing and naming constants used across the bus so
//! that tuning values are discoverable in one place.

use std::time::Duration;

// ============================================================================
// Channel naming
// ============================================================================

/// Default broadcast channel namespace used when a bus is constructed
/// without an explicit one.
pub const DEFAULT_NAMESPACE: &str = "tabbus";

// ============================================================================
// Timeouts
// ============================================================================

/// Default window during which a cross-tab request collects responses.
///
/// Peer contexts respond within single-digit milliseconds in practice;
/// 500ms leaves generous headroom for busy event loops without making
/// callers of `get_active_tabs` / `is_main` feel sluggish.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a tab must stay inactive before `inactive_too_long` reports
/// true and consumers should downgrade background work.
pub const INACTIVE_TOO_LONG: Duration = Duration::from_millis(60_000);

// ============================================================================
// Transport tuning
// ============================================================================

/// Buffered message capacity of an in-memory broadcast hub.
///
/// A slow subscriber that falls more than this many messages behind
/// starts losing the oldest ones. Cross-context delivery makes no
/// at-most-once or exactly-once guarantee, so lagging is logged and
/// tolerated rather than treated as an error.
pub const MEMORY_CHANNEL_CAPACITY: usize = 256;
