//! Debounce gate: commit a changing value only once it has settled
//!
//! A proposal takes effect only after the same value has been proposed
//! continuously for `settle`. Changing the input never echoes straight back
//! to the caller, so a half-typed port number or prompt is never acted on.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DebounceGate<T> {
    committed: T,
    pending: Option<(T, Instant)>,
    settle: Duration,
}

impl<T: Clone + PartialEq> DebounceGate<T> {
    pub fn new(initial: T, settle: Duration) -> Self {
        Self {
            committed: initial,
            pending: None,
            settle,
        }
    }

    /// Feed a candidate value observed at `now` and return the value that is
    /// currently in effect.
    ///
    /// Each distinct candidate restarts the settle timer, so an input that
    /// oscillates faster than `settle` never commits. A zero `settle` commits
    /// on the first proposal.
    pub fn propose(&mut self, value: T, now: Instant) -> &T {
        if value == self.committed {
            self.pending = None;
            return &self.committed;
        }

        let since = match &self.pending {
            Some((pending, since)) if *pending == value => *since,
            _ => {
                self.pending = Some((value.clone(), now));
                now
            }
        };

        if now.saturating_duration_since(since) >= self.settle {
            self.committed = value;
            self.pending = None;
        }
        &self.committed
    }

    pub fn committed(&self) -> &T {
        &self.committed
    }

    /// The candidate waiting to settle, if any.
    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(value, _)| value)
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Replace the committed value directly, discarding any pending proposal.
    pub fn force(&mut self, value: T) {
        self.committed = value;
        self.pending = None;
    }
}
