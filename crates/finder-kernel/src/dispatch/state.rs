//! Request lifecycle.
//!
//! ```text
//! Received ──▶ Validated ──▶ Executing ──▶ Aggregating ──▶ Filtering ──▶ Responded
//!    │             │             │
//!    └─────────────┴─────────────┴──▶ Error
//! ```

use std::fmt;

/// Where a request is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    Received,
    Validated,
    Executing,
    Aggregating,
    Filtering,
    Responded,
    Error,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::Validated => "validated",
            RequestState::Executing => "executing",
            RequestState::Aggregating => "aggregating",
            RequestState::Filtering => "filtering",
            RequestState::Responded => "responded",
            RequestState::Error => "error",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Error)
                | (Validated, Executing)
                | (Validated, Error)
                | (Executing, Aggregating)
                | (Executing, Error)
                | (Aggregating, Filtering)
                | (Filtering, Responded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Responded | RequestState::Error)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one request through its states.
#[derive(Debug)]
pub struct Lifecycle {
    state: RequestState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RequestState::Received,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Move to `next`. Illegal transitions are a bug in the dispatcher.
    pub fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal request transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "request state");
        self.state = next;
    }
}
