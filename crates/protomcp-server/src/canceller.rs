//! Request canceller (spec §4.3): one-shot cancellation signals keyed by
//! request id, so a handler can poll `is_cancelled` and abandon work when
//! `notifications/cancelled` arrives for its id.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

/// A one-shot cancellation signal. Cloning shares the same underlying
/// signal; `is_cancelled` is cheap to poll from a handler's work loop.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// `true` once `cancel` has been called for this request id.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Tracks in-flight request ids and lets either a cancellation notification
/// or a session-level shutdown signal them.
#[derive(Debug, Clone, Default)]
pub struct RequestCanceller {
    signals: Arc<DashMap<String, watch::Sender<bool>>>,
}

impl RequestCanceller {
    /// Construct an empty canceller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as in-flight, returning a signal the handler can poll.
    pub fn register(&self, id: &str) -> CancelSignal {
        let (tx, rx) = watch::channel(false);
        self.signals.insert(id.to_string(), tx);
        CancelSignal { rx }
    }

    /// Signal cancellation for `id`. Returns `false` (and logs at debug) if
    /// `id` is not currently registered — cancelling an unknown id has no
    /// observable side effect (spec §8 invariant).
    pub fn cancel(&self, id: &str, reason: Option<&str>) -> bool {
        match self.signals.get(id) {
            Some(tx) => {
                // The loser of a race with a concurrent `deregister` is a
                // no-op: `send` on a sender whose receivers were dropped
                // returns an error we deliberately ignore.
                let _ = tx.send(true);
                true
            }
            None => {
                debug!(request_id = id, reason, "cancel requested for unknown request id");
                false
            }
        }
    }

    /// Stop tracking `id`. Safe to call concurrently with `cancel`.
    pub fn deregister(&self, id: &str) {
        self.signals.remove(id);
    }

    /// Whether `id` has been cancelled. `false` for an unknown id.
    pub fn is_cancelled(&self, id: &str) -> bool {
        self.signals
            .get(id)
            .map(|tx| *tx.borrow())
            .unwrap_or(false)
    }

    /// Cancel and deregister every id still tracked — used on session
    /// shutdown (spec §5: "A session-level shutdown cancels all in-flight
    /// ids registered for that session").
    pub fn cancel_all(&self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            self.cancel(&id, Some("session shutdown"));
            self.deregister(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_unknown_id_returns_false() {
        let canceller = RequestCanceller::new();
        assert!(!canceller.cancel("req-1", None));
    }

    #[test]
    fn registered_signal_observes_cancellation() {
        let canceller = RequestCanceller::new();
        let signal = canceller.register("req-1");
        assert!(!signal.is_cancelled());
        assert!(canceller.cancel("req-1", Some("client requested")));
        assert!(signal.is_cancelled());
    }

    #[test]
    fn deregister_then_cancel_is_a_no_op() {
        let canceller = RequestCanceller::new();
        let _signal = canceller.register("req-1");
        canceller.deregister("req-1");
        assert!(!canceller.cancel("req-1", None));
    }

    #[test]
    fn is_cancelled_on_unknown_id_is_false() {
        let canceller = RequestCanceller::new();
        assert!(!canceller.is_cancelled("ghost"));
    }
}
