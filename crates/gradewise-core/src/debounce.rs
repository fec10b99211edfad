//! Trailing-edge debounce of rewrite requests, one pending timer per session.

use crate::engine::Engine;
use gradewise_domain::entities::{Priority, RewriteResult, TargetLevel};
use gradewise_domain::errors::RewriteError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceRequest {
    pub text: String,
    pub target_level: TargetLevel,
}

#[derive(Debug)]
pub struct DebouncedOutcome {
    pub session_id: String,
    pub request: DebounceRequest,
    pub result: Result<Arc<RewriteResult>, RewriteError>,
}

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct DebounceScheduler {
    engine: Arc<Engine>,
    default_delay: Duration,
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    generation: AtomicU64,
    outcomes: Option<mpsc::UnboundedSender<DebouncedOutcome>>,
}

impl DebounceScheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        let default_delay = engine.config().debounce_delay();
        Self {
            engine,
            default_delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            outcomes: None,
        }
    }

    /// Dispatched results are sent here; without a channel they are dropped
    /// (the engine cache still keeps them).
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<DebouncedOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Replaces any pending request for `session_id` and restarts its timer.
    /// Only the last request scheduled inside the delay window is dispatched,
    /// at low priority. Must be called from within a tokio runtime.
    pub fn schedule(&self, session_id: impl Into<String>, request: DebounceRequest, delay: Option<Duration>) {
        let session_id = session_id.into();
        let delay = delay.unwrap_or(self.default_delay);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let engine = self.engine.clone();
        let pending = self.pending.clone();
        let outcomes = self.outcomes.clone();
        let sid = session_id.clone();
        // Held across spawn and insert so a zero-delay timer cannot look up
        // its own entry before it exists.
        let mut map = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = pending.lock();
                if map.get(&sid).map(|p| p.generation) != Some(generation) {
                    return;
                }
                map.remove(&sid);
            }
            debug!(target: "gradewise.debounce", session = %sid, "debounce fired");
            let result = engine
                .rewrite_for_grade_level(&request.text, request.target_level, Priority::Low)
                .await;
            if let Some(tx) = outcomes {
                let _ = tx.send(DebouncedOutcome { session_id: sid, request, result });
            }
        });

        if let Some(prev) = map.insert(session_id.clone(), Pending { generation, handle }) {
            prev.handle.abort();
            debug!(target: "gradewise.debounce", session = %session_id, "superseded pending request");
        }
    }

    pub fn cancel(&self, session_id: &str) -> bool {
        match self.pending.lock().remove(session_id) {
            Some(p) => {
                p.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> usize { self.pending.lock().len() }
}
