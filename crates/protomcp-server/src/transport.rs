//! Transport adapter trait boundary (spec §6).
//!
//! Concrete byte-framing (stdio content-length framing, WebSocket upgrade,
//! SSE, ...) is out of scope for this core; an adapter hands the dispatch
//! core already-framed JSON-RPC payloads through these two traits.

use async_trait::async_trait;
use serde_json::Value;

use protomcp_protocol::{ClientCapabilities, ProtocolVersion};

use crate::error::ServerResult;

/// A single already-framed JSON-RPC payload, in either direction.
pub type Frame = Value;

/// Byte-level transport boundary: receive/send framed payloads, close.
///
/// Implementations own the concrete framing (content-length prefix,
/// WebSocket text frame, SSE event, ...) and hand the core (or receive from
/// it) a fully decoded [`Frame`].
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Block until the next frame arrives. `Ok(None)` signals a clean EOF.
    async fn receive(&mut self) -> ServerResult<Option<Frame>>;

    /// Send a frame to the peer.
    async fn send(&mut self, frame: Frame) -> ServerResult<()>;

    /// Close the underlying transport.
    async fn close(&mut self) -> ServerResult<()>;
}

/// The session-facing surface the dispatch core drives (spec §6: "a session
/// exposes `sessionID, sendResponse, sendNotification, close, initialize,
/// initialized, setNegotiatedVersion, getNegotiatedVersion,
/// storeClientCapabilities, getClientCapabilities`").
///
/// A transport adapter's session type implements this so dispatch can drive
/// lifecycle and response delivery without knowing the adapter's concrete
/// framing.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// This session's opaque id.
    fn session_id(&self) -> &str;

    /// Send a JSON-RPC response frame.
    async fn send_response(&self, response: Frame) -> ServerResult<()>;

    /// Send a JSON-RPC notification frame.
    async fn send_notification(&self, notification: Frame) -> ServerResult<()>;

    /// Send a server-initiated JSON-RPC request frame (spec §4.7 step 6).
    /// Not named in spec §6's session contract, which enumerates only the
    /// client-request-response and notification paths; added because the
    /// sampling controller has no other way to reach the transport.
    async fn send_request(&self, request: Frame) -> ServerResult<()>;

    /// Close the session's transport.
    async fn close(&self) -> ServerResult<()>;

    /// Mark the session as having completed `initialize`.
    fn initialize(&self);

    /// Mark the session as having received `notifications/initialized`.
    fn initialized(&self);

    /// Record the version negotiated during `initialize`.
    fn set_negotiated_version(&self, version: ProtocolVersion);

    /// The version negotiated during `initialize`, if any yet.
    fn negotiated_version(&self) -> Option<ProtocolVersion>;

    /// Store the client's declared capabilities for this session.
    fn store_client_capabilities(&self, capabilities: ClientCapabilities);

    /// The client's declared capabilities, if `initialize` has completed.
    fn client_capabilities(&self) -> Option<ClientCapabilities>;
}

/// Enabled by the crate's own unit tests, and by integration tests via the
/// `test-support` feature (this crate lists itself as a dev-dependency with
/// that feature on, the usual way to share test doubles across the `tests/`
/// boundary without exporting them from the public API unconditionally).
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// An in-memory [`TransportAdapter`] + [`TransportSession`] pair for
    /// dispatch-core tests: frames queued with `push_inbound` are handed
    /// back from `receive`; frames sent via `send`/`send_response`/
    /// `send_notification` land in `sent`.
    #[derive(Clone, Default)]
    pub struct MemoryTransport {
        pub id: String,
        pub inbound: Arc<Mutex<VecDeque<Frame>>>,
        pub sent: Arc<Mutex<Vec<Frame>>>,
        pub negotiated_version: Arc<Mutex<Option<ProtocolVersion>>>,
        pub client_capabilities: Arc<Mutex<Option<ClientCapabilities>>>,
        pub closed: Arc<Mutex<bool>>,
    }

    impl MemoryTransport {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                ..Default::default()
            }
        }

        pub fn push_inbound(&self, frame: Frame) {
            self.inbound.lock().push_back(frame);
        }
    }

    #[async_trait]
    impl TransportAdapter for MemoryTransport {
        async fn receive(&mut self) -> ServerResult<Option<Frame>> {
            Ok(self.inbound.lock().pop_front())
        }

        async fn send(&mut self, frame: Frame) -> ServerResult<()> {
            self.sent.lock().push(frame);
            Ok(())
        }

        async fn close(&mut self) -> ServerResult<()> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    #[async_trait]
    impl TransportSession for MemoryTransport {
        fn session_id(&self) -> &str {
            &self.id
        }

        async fn send_response(&self, response: Frame) -> ServerResult<()> {
            self.sent.lock().push(response);
            Ok(())
        }

        async fn send_notification(&self, notification: Frame) -> ServerResult<()> {
            self.sent.lock().push(notification);
            Ok(())
        }

        async fn send_request(&self, request: Frame) -> ServerResult<()> {
            self.sent.lock().push(request);
            Ok(())
        }

        async fn close(&self) -> ServerResult<()> {
            *self.closed.lock() = true;
            Ok(())
        }

        fn initialize(&self) {}

        fn initialized(&self) {}

        fn set_negotiated_version(&self, version: ProtocolVersion) {
            *self.negotiated_version.lock() = Some(version);
        }

        fn negotiated_version(&self) -> Option<ProtocolVersion> {
            *self.negotiated_version.lock()
        }

        fn store_client_capabilities(&self, capabilities: ClientCapabilities) {
            *self.client_capabilities.lock() = Some(capabilities);
        }

        fn client_capabilities(&self) -> Option<ClientCapabilities> {
            self.client_capabilities.lock().clone()
        }
    }
}
