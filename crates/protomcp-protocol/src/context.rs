//! Per-request context threaded through handler invocation.

use protomcp_core::ProtocolVersion;
use std::collections::HashMap;

/// Context passed to every tool/resource/prompt handler invocation.
///
/// Carries enough of the session's identity and negotiated state for a
/// handler to, e.g., check the caller's capabilities or call back into the
/// sampling controller — without giving the handler direct access to the
/// session manager's internals.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Owning session id.
    pub session_id: String,
    /// Protocol version negotiated for this session.
    pub protocol_version: ProtocolVersion,
    /// The JSON-RPC request id this invocation is answering, if any
    /// (absent for notification-triggered work).
    pub request_id: Option<String>,
    /// Free-form request-scoped metadata (e.g. tracing fields).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    /// Build a context for a request carrying an id.
    pub fn new(session_id: impl Into<String>, protocol_version: ProtocolVersion, request_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            protocol_version,
            request_id: Some(request_id.into()),
            metadata: HashMap::new(),
        }
    }

    /// Build a context for a notification (no request id to respond to).
    pub fn for_notification(session_id: impl Into<String>, protocol_version: ProtocolVersion) -> Self {
        Self {
            session_id: session_id.into(),
            protocol_version,
            request_id: None,
            metadata: HashMap::new(),
        }
    }
}
