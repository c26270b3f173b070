//! Session manager (spec §4.1).
//!
//! Sessions are created on a successful `initialize` and destroyed on
//! explicit close or transport disconnect. The map is a `DashMap` so reads
//! (dispatch routing) and writes (capability updates, `last_active` touches)
//! never contend on a single global lock — mirrors the teacher's use of
//! `dashmap` for its handler registries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use protomcp_protocol::capabilities::Metadata;
use protomcp_protocol::{ClientCapabilities, ProtocolVersion};

/// A single client session's identity and negotiated state (spec §3).
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque, process-unique identifier.
    pub id: String,
    /// Wall-clock creation time (Unix millis).
    pub created_at: u64,
    /// Wall-clock time of the last `update` call (Unix millis).
    pub last_active_at: u64,
    /// Version negotiated during `initialize`.
    pub protocol_version: ProtocolVersion,
    /// Capabilities the client declared, immutable between re-initializes.
    pub client_capabilities: ClientCapabilities,
    /// Free-form metadata the embedder may attach.
    pub metadata: Metadata,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generates session ids from a process-start time-entropy seed plus a
/// monotone counter, so ids stay unique across restarts without any shared
/// coordination (spec §4.1, design note "Monotone ID generation").
#[derive(Debug)]
struct IdGenerator {
    seed: u64,
    counter: AtomicU64,
}

impl IdGenerator {
    fn new() -> Self {
        Self {
            seed: now_millis(),
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("sess-{:x}-{:x}", self.seed, n)
    }
}

/// Creates, looks up, updates, and closes [`Session`]s.
///
/// All operations are safe under concurrent access; `get`/`update`/`close`
/// on an unknown id return `None`/`false` rather than erroring (spec §4.1).
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, Session>>,
    ids: Arc<IdGenerator>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Construct an empty session manager.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ids: Arc::new(IdGenerator::new()),
        }
    }

    /// Create and store a new session, returning it.
    pub fn create(&self, protocol_version: ProtocolVersion, client_capabilities: ClientCapabilities) -> Session {
        self.create_with_id(self.ids.next(), protocol_version, client_capabilities)
    }

    /// Create and store a new session under a caller-supplied id, rather
    /// than generating one. Used by the dispatch core, which already has a
    /// stable id from the transport adapter and has no use for a second,
    /// independently generated one.
    pub fn create_with_id(
        &self,
        id: impl Into<String>,
        protocol_version: ProtocolVersion,
        client_capabilities: ClientCapabilities,
    ) -> Session {
        let now = now_millis();
        let session = Session {
            id: id.into(),
            created_at: now,
            last_active_at: now,
            protocol_version,
            client_capabilities,
            metadata: HashMap::new(),
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a session by id.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Apply `mutator` to the session under `id`, touching `last_active_at`.
    /// Returns `false` if the session does not exist.
    pub fn update(&self, id: &str, mutator: impl FnOnce(&mut Session)) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                mutator(&mut entry);
                entry.last_active_at = now_millis();
                true
            }
            None => false,
        }
    }

    /// Replace the session's client capabilities (e.g. on re-`initialize`).
    pub fn update_client_capabilities(&self, id: &str, caps: ClientCapabilities) -> bool {
        self.update(id, |s| s.client_capabilities = caps)
    }

    /// Remove a session. Returns `false` if it did not exist.
    pub fn close(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// `true` if there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let mgr = SessionManager::new();
        let s = mgr.create(ProtocolVersion::latest(), ClientCapabilities::default());
        let fetched = mgr.get(&s.id).expect("session should exist");
        assert_eq!(fetched.id, s.id);
    }

    #[test]
    fn get_unknown_id_returns_none() {
        let mgr = SessionManager::new();
        assert!(mgr.get("nope").is_none());
    }

    #[test]
    fn update_touches_last_active() {
        let mgr = SessionManager::new();
        let s = mgr.create(ProtocolVersion::latest(), ClientCapabilities::default());
        let before = s.last_active_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(mgr.update(&s.id, |sess| sess.metadata.insert("k".into(), serde_json::json!(1))));
        let after = mgr.get(&s.id).unwrap().last_active_at;
        assert!(after >= before);
    }

    #[test]
    fn update_unknown_id_returns_false() {
        let mgr = SessionManager::new();
        assert!(!mgr.update("nope", |_| {}));
    }

    #[test]
    fn close_unknown_id_returns_false() {
        let mgr = SessionManager::new();
        assert!(!mgr.close("nope"));
    }

    #[test]
    fn generated_ids_are_unique() {
        let mgr = SessionManager::new();
        let a = mgr.create(ProtocolVersion::latest(), ClientCapabilities::default());
        let b = mgr.create(ProtocolVersion::latest(), ClientCapabilities::default());
        assert_ne!(a.id, b.id);
    }
}
