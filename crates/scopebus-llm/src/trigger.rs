//! Fire-on-change-or-interval policy for live-edited query text
//!
//! The request text (e.g. a prompt box being typed into) is debounced first.
//! A query fires as soon as the settled text differs from the text used for
//! the previous fire, or when the interval elapses, whichever comes first,
//! and never while a query is in flight.

use crate::client::QueryClient;
use scopebus_core::DebounceGate;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FireTrigger {
    settle: Duration,
    gate: Option<DebounceGate<String>>,
    last_fired: Option<String>,
}

impl FireTrigger {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            gate: None,
            last_fired: None,
        }
    }

    /// The settled text as of the last call.
    pub fn settled(&self) -> Option<&str> {
        self.gate.as_ref().map(|gate| gate.committed().as_str())
    }

    pub fn last_fired(&self) -> Option<&str> {
        self.last_fired.as_deref()
    }

    /// Feed the current text and decide whether to fire. Returns the text to
    /// send, and records it as fired; the caller must then fire it.
    ///
    /// The first text seen is taken as already settled.
    pub fn poll(
        &mut self,
        client: &QueryClient,
        text: &str,
        interval: Duration,
        now: Instant,
    ) -> Option<String> {
        let settle = self.settle;
        let gate = self
            .gate
            .get_or_insert_with(|| DebounceGate::new(text.to_string(), settle));
        let settled = gate.propose(text.to_string(), now).clone();

        if settled.is_empty() || client.is_pending() {
            return None;
        }
        let changed = self.last_fired.as_deref() != Some(settled.as_str());
        if changed || client.should_send(interval, now) {
            self.last_fired = Some(settled.clone());
            return Some(settled);
        }
        None
    }
}
