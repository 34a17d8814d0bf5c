//! Tab activity signals.
//!
//! Contexts with a window report focus, blur and visibility changes to
//! their bus; the bus folds them into the `active` flag, broadcasts the
//! transition on `tab:uuid`, and derives `inactive_too_long` from the
//! time of the last active→inactive flip. Contexts without a window
//! (servers, workers) simply never report, leaving `active`
//! undetermined.

/// A window-level signal affecting tab activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    /// The window gained focus.
    Focused,
    /// The window lost focus.
    Blurred,
    /// Document visibility changed; `true` means visible.
    VisibilityChanged(bool),
}

impl ActivitySignal {
    /// The activity value this signal resolves to.
    pub fn is_active(self) -> bool {
        match self {
            Self::Focused => true,
            Self::Blurred => false,
            Self::VisibilityChanged(visible) => visible,
        }
    }
}
