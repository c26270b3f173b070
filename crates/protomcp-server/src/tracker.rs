//! Request tracker (spec §4.4): correlates server-initiated request ids
//! (sampling, roots, etc.) with the client's eventual response, with a
//! per-request timeout.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use protomcp_core::Error as CoreError;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// What a correlated response turned out to be: the peer's `result`, or a
/// classified error built from its `error` object (spec §4.4, §4.7 step 11).
pub type ResponseOutcome = Result<Value, CoreError>;

struct PendingRequest {
    responder: oneshot::Sender<ResponseOutcome>,
    timer: JoinHandle<()>,
}

/// Generates monotone `i64` request ids, seeded from wall-clock time on
/// first use so ids stay distinct across process restarts (spec §4.4,
/// §9 design note "Monotone ID generation").
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicI64,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(1);
        Self {
            next: AtomicI64::new(seed),
        }
    }
}

impl RequestIdGenerator {
    /// Allocate the next id.
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Tracks pending server-initiated requests awaiting a client response.
///
/// The response channel is a one-shot, which is inherently "buffered 1":
/// a late response arriving after the waiter timed out and moved on is
/// simply dropped rather than blocking the resolver (spec §4.4).
#[derive(Debug, Clone)]
pub struct RequestTracker {
    pending: Arc<DashMap<i64, PendingRequest>>,
    ids: Arc<RequestIdGenerator>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTracker {
    /// Construct an empty tracker.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            ids: Arc::new(RequestIdGenerator::default()),
        }
    }

    /// Allocate a fresh request id.
    pub fn next_id(&self) -> i64 {
        self.ids.next()
    }

    /// Register `id` as awaiting a response, with a timeout of `timeout`
    /// that removes the entry when it fires (spec §4.4 "Ordering").
    /// Returns the receiver half of the response channel.
    pub fn add_request(&self, id: i64, timeout: Duration) -> oneshot::Receiver<ResponseOutcome> {
        let (tx, rx) = oneshot::channel();
        let pending = self.pending.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            pending.remove(&id);
        });
        self.pending.insert(id, PendingRequest { responder: tx, timer });
        rx
    }

    /// Replace the timeout timer for an already-registered request, used
    /// when a sampling retry bumps the deadline (spec §4.7 step 9).
    pub fn setup_timeout(&self, id: i64, timeout: Duration) {
        if let Some(mut entry) = self.pending.get_mut(&id) {
            entry.timer.abort();
            let pending = self.pending.clone();
            entry.timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                pending.remove(&id);
            });
        }
    }

    /// Deliver `payload` to the waiter for `id`, stop its timer, and
    /// remove it. Returns `false` (payload discarded, logged at warn) if
    /// `id` is unknown — e.g. already timed out (spec §4.4, §8 invariant).
    pub fn resolve_request(&self, id: i64, payload: ResponseOutcome) -> bool {
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                entry.timer.abort();
                // The receiver may already be dropped if the waiter gave up
                // for another reason; that race is a harmless no-op.
                let _ = entry.responder.send(payload);
                true
            }
            None => {
                warn!(request_id = id, "response for unknown or expired server-initiated request id");
                false
            }
        }
    }

    /// Remove `id` without resolving it, e.g. on session teardown.
    pub fn remove_request(&self, id: i64) {
        if let Some((_, entry)) = self.pending.remove(&id) {
            entry.timer.abort();
        }
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
