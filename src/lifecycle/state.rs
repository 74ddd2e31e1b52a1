//! Listener lifecycle states.
//!
//! ```text
//! Unbound → Bound → Accepting → Draining → Closed
//!    ↓
//! FailedToBind
//! ```

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    Unbound,
    Bound,
    Accepting,
    Draining,
    Closed,
    FailedToBind,
}

impl ListenerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerState::Unbound => "unbound",
            ListenerState::Bound => "bound",
            ListenerState::Accepting => "accepting",
            ListenerState::Draining => "draining",
            ListenerState::Closed => "closed",
            ListenerState::FailedToBind => "failed_to_bind",
        }
    }

    /// Whether the machine may move from `self` to `next`.
    ///
    /// `Bound → Draining` is allowed so a shutdown that lands between bind
    /// and the first accept still drains cleanly.
    pub fn can_transition_to(self, next: ListenerState) -> bool {
        use ListenerState::*;
        matches!(
            (self, next),
            (Unbound, Bound)
                | (Unbound, FailedToBind)
                | (Bound, Accepting)
                | (Bound, Draining)
                | (Accepting, Draining)
                | (Draining, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ListenerState::Closed | ListenerState::FailedToBind)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attempted transition the machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal listener transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ListenerState,
    pub to: ListenerState,
}
