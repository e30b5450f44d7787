//! Non-blocking query client
//!
//! Wraps one [`QueryBackend`] for use from a synchronous frame loop. At most
//! one query is in flight at a time; each runs as its own task on a tokio
//! runtime so the caller returns immediately. The result is read back with
//! [`QueryClient::last_response`], a snapshot that never observes a partial
//! value.
//!
//! Failures are logged and leave the last response untouched. There are no
//! automatic retries: the caller's next `should_send` window is the retry.

use crate::provider::{QueryBackend, QueryError, QueryResult};
use crate::types::QueryRequest;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{debug, info, warn};

/// Completion hook, run on the background task with the response text.
/// Only cheap, non-blocking work belongs here (e.g. posting to an `Outbox`).
pub type OnComplete = Box<dyn FnOnce(&str) + Send + 'static>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub fired: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct QueryState {
    in_flight: bool,
    last_fire: Option<Instant>,
    last_response: String,
    stats: QueryStats,
}

fn lock(state: &Mutex<QueryState>) -> MutexGuard<'_, QueryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears `in_flight` when the task ends, including by panic.
struct InFlightGuard(Arc<Mutex<QueryState>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.0).in_flight = false;
    }
}

pub struct QueryClient {
    backend: Arc<dyn QueryBackend>,
    state: Arc<Mutex<QueryState>>,
    handle: Handle,
    /// Present when no runtime was running at construction.
    runtime: Option<Runtime>,
}

impl QueryClient {
    /// Create a client on the current multi-threaded tokio runtime, or on a
    /// private single-worker runtime otherwise.
    ///
    /// A current-thread runtime only runs tasks while its own thread yields,
    /// which a blocking frame loop never does, so it is not reused.
    pub fn new(backend: Arc<dyn QueryBackend>) -> QueryResult<Self> {
        if let Ok(handle) = Handle::try_current() {
            if handle.runtime_flavor() != RuntimeFlavor::CurrentThread {
                return Ok(Self::with_handle(backend, handle));
            }
            debug!("current runtime is single-threaded, starting a private one");
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scopebus-query")
            .enable_all()
            .build()
            .map_err(|e| QueryError::Runtime(e.to_string()))?;
        let handle = runtime.handle().clone();
        Ok(Self {
            backend,
            state: Arc::default(),
            handle,
            runtime: Some(runtime),
        })
    }

    pub fn with_handle(backend: Arc<dyn QueryBackend>, handle: Handle) -> Self {
        Self {
            backend,
            state: Arc::default(),
            handle,
            runtime: None,
        }
    }

    pub fn backend(&self) -> &dyn QueryBackend {
        self.backend.as_ref()
    }

    /// True when idle and at least `min_interval` has passed since the last
    /// fire (or nothing has been fired yet).
    pub fn should_send(&self, min_interval: Duration, now: Instant) -> bool {
        let state = lock(&self.state);
        if state.in_flight {
            return false;
        }
        match state.last_fire {
            Some(fired) => now.saturating_duration_since(fired) >= min_interval,
            None => true,
        }
    }

    /// Start `request` in the background. Returns false, and does nothing,
    /// while another query is in flight.
    pub fn fire_async(&self, request: QueryRequest, on_complete: Option<OnComplete>) -> bool {
        {
            let mut state = lock(&self.state);
            if state.in_flight {
                debug!(backend = self.backend.name(), "query already in flight");
                return false;
            }
            state.in_flight = true;
            state.last_fire = Some(Instant::now());
            state.stats.fired += 1;
        }

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        self.handle.spawn(async move {
            let guard = InFlightGuard(Arc::clone(&state));
            let result = backend.query(request).await;

            let text = {
                let mut state = lock(&state);
                match result {
                    Ok(text) => {
                        state.last_response = text.clone();
                        state.stats.completed += 1;
                        Some(text)
                    }
                    Err(e) => {
                        state.stats.failed += 1;
                        warn!(
                            backend = backend.name(),
                            model = backend.model(),
                            error = %e,
                            "query failed"
                        );
                        None
                    }
                }
            };
            drop(guard);

            if let Some(text) = text {
                info!(backend = backend.name(), bytes = text.len(), "query complete");
                if let Some(callback) = on_complete {
                    callback(&text);
                }
            }
        });
        true
    }

    /// Snapshot of the most recent successful response; empty before the
    /// first one. Safe to call while a query is in flight.
    pub fn last_response(&self) -> String {
        lock(&self.state).last_response.clone()
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).in_flight
    }

    pub fn last_fire(&self) -> Option<Instant> {
        lock(&self.state).last_fire
    }

    pub fn stats(&self) -> QueryStats {
        lock(&self.state).stats
    }
}

impl Drop for QueryClient {
    fn drop(&mut self) {
        // in-flight tasks are abandoned, not awaited
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
