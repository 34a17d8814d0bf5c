//! Shared event vocabulary.
//!
//! The bus accepts any string as an event name; these constants cover
//! the names its collaborators (storage, identity, push, service-worker
//! glue) already agree on, so call sites avoid typo-prone literals.
//! Applications extend the vocabulary freely with their own names.

/// `from` value carried by worker-originated events.
pub const FROM_SERVICE_WORKER: &str = "service-worker";

// ============================================================================
// API / identity
// ============================================================================

/// The API returned a 401 Unauthorized status.
pub const API_UNAUTHORIZED: &str = "api:unauthorized";
/// A user was authenticated; args: bearer token, expiration, identity.
pub const IDENTITY_LOGIN: &str = "identity:login";
/// The user was logged out.
pub const IDENTITY_LOGOUT: &str = "identity:logout";
/// The authentication token is eligible for refresh. The main tab (see
/// `EventBus::is_main`) performs the refresh; the rest observe.
pub const AUTHENTICATION_REFRESHABLE: &str = "authentication:refreshable";

// ============================================================================
// Tab lifecycle
// ============================================================================

/// A tab announced its state; args: uuid, active. Broadcast cross-tab
/// only — this is how peers learn each other's activity without a
/// request round.
pub const TAB_UUID: &str = "tab:uuid";
/// This tab became active. Local only.
pub const TAB_ACTIVE: &str = "tab:active";
/// This tab became inactive. Local only.
pub const TAB_INACTIVE: &str = "tab:inactive";

// ============================================================================
// Push / firebase
// ============================================================================

/// The push service re-registered or changed subscription state.
pub const PUSH_UPDATED: &str = "push:updated";
/// Notification permission was granted.
pub const PUSH_PERMISSION_GRANTED: &str = "push:permission:granted";
/// Notification permission was denied.
pub const PUSH_PERMISSION_DENIED: &str = "push:permission:denied";
/// A push notification arrived; args: payload.
pub const PUSH_NOTIFICATION: &str = "push:notification";
/// The messaging token changed; args: new token.
pub const FIREBASE_TOKEN_UPDATED: &str = "firebase:token:updated";

// ============================================================================
// Local storage
// ============================================================================

/// Stored data changed.
pub const LS_CHANGE: &str = "ls:change";
/// Stored data finished loading.
pub const LS_LOADED: &str = "ls:loaded";
/// A key was written; args: key, data.
pub const LS_SET: &str = "ls:set";
/// Storage was cleared.
pub const LS_CLEAR: &str = "ls:clear";
/// All keys were reset.
pub const LS_RESET: &str = "ls:reset";

// ============================================================================
// Service worker lifecycle (opaque re-publications, one per native event)
// ============================================================================

/// Worker `install` event.
pub const SW_INSTALL: &str = "sw:install";
/// Worker `activate` event.
pub const SW_ACTIVATE: &str = "sw:activate";
/// Worker `fetch` event.
pub const SW_FETCH: &str = "sw:fetch";
/// Worker `message` event.
pub const SW_MESSAGE: &str = "sw:message";
/// Worker `messageerror` event.
pub const SW_MESSAGE_ERROR: &str = "sw:messageerror";
/// Worker `notificationclick` event.
pub const SW_NOTIFICATION_CLICK: &str = "sw:notificationclick";
/// Worker `notificationclose` event.
pub const SW_NOTIFICATION_CLOSE: &str = "sw:notificationclose";
/// Worker `push` event.
pub const SW_PUSH: &str = "sw:push";
/// Worker `pushsubscriptionchange` event.
pub const SW_PUSH_SUBSCRIPTION_CHANGE: &str = "sw:pushsubscriptionchange";
/// Worker `sync` event.
pub const SW_SYNC: &str = "sw:sync";

// ============================================================================
// Web fonts
// ============================================================================

/// Web fonts started loading.
pub const WEBFONTS_LOADING: &str = "webfonts:loading";
/// Web fonts are active.
pub const WEBFONTS_ACTIVE: &str = "webfonts:active";
/// Web fonts failed or are inactive.
pub const WEBFONTS_INACTIVE: &str = "webfonts:inactive";
