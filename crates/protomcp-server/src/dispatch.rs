//! Lifecycle and dispatch core (spec §4.6): the per-session state machine,
//! JSON-RPC routing table, and result shaping that ties every other
//! component in this crate together.
//!
//! Mirrors the teacher's `router::route_request` shape (parse envelope,
//! validate `initialize`, negotiate version with a logged fallback, build
//! filtered capabilities) generalized to the session-state-machine and
//! method table this core implements.

use std::collections::HashSet;

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, warn};

use protomcp_core::{error_codes, ProtocolVersion};
use protomcp_core::jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use protomcp_protocol::capabilities::{Implementation, InitializeParams, InitializeResult};
use protomcp_protocol::{methods, RequestContext, LIST_PAGE_SIZE};

use crate::canceller::RequestCanceller;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::{Registry, ResourceResolution};
use crate::sampling::SamplingController;
use crate::session::SessionManager;
use crate::subscription::SubscriptionManager;
use crate::tracker::RequestTracker;
use crate::transport::TransportSession;

/// Runs a handler invocation on its own task so a panicking handler surfaces
/// as an `InternalError` response instead of aborting the connection's
/// dispatch task (spec §4.6 "handler panics are recovered"). Tokio already
/// catches panics at the task boundary and reports them through `JoinError`,
/// the same signal the teacher's TCP transport inspects via `is_panic()`
/// when reaping finished tasks.
async fn guard_handler_panic<F>(fut: F) -> ServerResult<Value>
where
    F: std::future::Future<Output = ServerResult<Value>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(outcome) => outcome,
        // `Error::Internal` is the catch-all for a recovered panic (see its
        // doc comment); routing through it rather than `ServerError::Handler`
        // means `tools/call` reports this as a JSON-RPC failure via the
        // `Protocol` arm instead of shaping it into an `isError: true` tool
        // result, the same way every other protocol-level failure is.
        Err(join_err) if join_err.is_panic() => {
            Err(ServerError::Protocol(protomcp_core::Error::Internal("handler panicked".into())))
        }
        Err(_) => Err(ServerError::handler("handler task was cancelled")),
    }
}

/// A session's place in the lifecycle state machine (spec §4.6).
///
/// `New` and `Initializing` are not tracked as distinct states here: both
/// exist only for the duration of handling a single `initialize` call, and
/// collapsing them costs nothing since no other inbound message can
/// interleave with that handling for the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, `initialize` not yet completed.
    AwaitingInitialize,
    /// `initialize` succeeded; routable.
    Ready,
    /// `shutdown` received; no longer accepting new work besides `exit`.
    Draining,
    /// `exit` received or the transport closed.
    Terminated,
}

/// Owns every shared component (spec §5: "the server owns `{Sessions,
/// Registry, Subscriptions, Canceller, Tracker, SamplingController}`
/// process-wide") and routes inbound frames to them.
pub struct DispatchCore {
    sessions: SessionManager,
    registry: Registry,
    subscriptions: SubscriptionManager,
    canceller: RequestCanceller,
    tracker: RequestTracker,
    sampling: SamplingController,
    config: ServerConfig,
    states: DashMap<String, SessionState>,
    session_requests: DashMap<String, HashSet<String>>,
}

impl DispatchCore {
    /// Build a fresh dispatch core with empty registries and session state.
    pub fn new(config: ServerConfig) -> Self {
        let tracker = RequestTracker::new();
        let sampling = SamplingController::new(config.sampling, tracker.clone());
        Self {
            sessions: SessionManager::new(),
            registry: Registry::new(),
            subscriptions: SubscriptionManager::new(),
            canceller: RequestCanceller::new(),
            tracker,
            sampling,
            config,
            states: DashMap::new(),
            session_requests: DashMap::new(),
        }
    }

    /// The tool/resource/template/prompt registry, for embedders to register against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The session manager, for embedders that want to inspect live sessions.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The subscription manager, for embedders firing `resources/updated`.
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// The sampling controller, for embedders initiating `sampling/createMessage`.
    pub fn sampling(&self) -> &SamplingController {
        &self.sampling
    }

    /// The request tracker, shared with the sampling controller for
    /// response-ingestion routing.
    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// This session's current lifecycle state, or `AwaitingInitialize` if
    /// it has not yet sent a first message.
    pub fn session_state(&self, sid: &str) -> SessionState {
        self.states.get(sid).map(|s| *s).unwrap_or(SessionState::AwaitingInitialize)
    }

    /// Entry point for every frame a transport adapter hands up: either a
    /// client request/notification, or a response to a server-initiated
    /// sampling request. Returns the frame to send back via
    /// [`TransportSession::send_response`], or `None` for notifications and
    /// ingested responses.
    pub async fn handle_frame(&self, session: &dyn TransportSession, raw: Value) -> Option<Value> {
        if raw.get("method").is_some() {
            self.route(session, raw).await
        } else {
            self.ingest_response(raw);
            None
        }
    }

    /// Transport EOF/error for `sid`: any state transitions to `Terminated`
    /// (spec §4.6 "Any state --transport error/EOF--> Terminated").
    pub async fn handle_disconnect(&self, sid: &str) {
        self.states.insert(sid.to_string(), SessionState::Terminated);
        self.teardown_session(sid).await;
    }

    /// A server-initiated request's response arrives as a full JSON-RPC
    /// envelope (`{"jsonrpc", "id", "result"}` or `{"jsonrpc", "id",
    /// "error"}`); the tracker's waiters only care about the unwrapped
    /// `result`, or a classified [`protomcp_core::Error::Remote`] built
    /// from `error`, not the envelope itself.
    fn ingest_response(&self, raw: Value) {
        let Some(id) = raw.get("id").and_then(Value::as_i64) else {
            warn!("dropped an inbound frame with no method and no numeric id");
            return;
        };

        let outcome = match raw.get("error") {
            Some(error) => {
                let code = error
                    .get("code")
                    .and_then(Value::as_i64)
                    .map(|c| c as i32)
                    .unwrap_or(error_codes::INTERNAL_ERROR);
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("remote error")
                    .to_string();
                Err(protomcp_core::Error::Remote { code, message })
            }
            None => Ok(raw.get("result").cloned().unwrap_or(Value::Null)),
        };

        let _ = self.tracker.resolve_request(id, outcome);
    }

    async fn route(&self, session: &dyn TransportSession, raw: Value) -> Option<Value> {
        let sid = session.session_id().to_string();

        let request: JsonRpcRequest = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(e) => {
                let id = raw.get("id").and_then(|v| serde_json::from_value(v.clone()).ok());
                return match id {
                    Some(id) => Some(to_value(JsonRpcResponse::failure(
                        id,
                        JsonRpcError::new(error_codes::INVALID_REQUEST, format!("malformed request: {e}")),
                    ))),
                    None => {
                        warn!(session_id = %sid, "malformed first-contact message with no usable id; terminating session");
                        self.states.insert(sid.clone(), SessionState::Terminated);
                        None
                    }
                };
            }
        };

        let state = self.session_state(&sid);

        if state == SessionState::Terminated {
            return None;
        }

        if state == SessionState::AwaitingInitialize && request.method != methods::INITIALIZE {
            self.states.insert(sid.clone(), SessionState::Terminated);
            return request.id.map(|id| {
                to_value(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(error_codes::INVALID_REQUEST, "session must call initialize before any other method"),
                ))
            });
        }

        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(session, &sid, request).await,
            methods::INITIALIZED => {
                let ctx = RequestContext::for_notification(sid.clone(), self.session_version(&sid));
                debug!(session_id = %ctx.session_id, version = ?ctx.protocol_version, "session entered Ready state");
                session.initialized();
                None
            }
            methods::SHUTDOWN => self.handle_shutdown(&sid, request),
            methods::EXIT => {
                self.handle_exit(&sid).await;
                None
            }
            methods::NOTIFICATIONS_CANCELLED => {
                let ctx = RequestContext::for_notification(sid.clone(), self.session_version(&sid));
                self.handle_cancelled(ctx, request);
                None
            }
            methods::TOOLS_LIST => self.handle_tools_list(request),
            methods::TOOLS_CALL => self.handle_tools_call(&sid, request).await,
            methods::RESOURCES_LIST => self.handle_resources_list(request),
            methods::RESOURCES_READ => self.handle_resources_read(&sid, request).await,
            methods::RESOURCES_SUBSCRIBE => self.handle_resources_subscribe(&sid, request),
            methods::RESOURCES_UNSUBSCRIBE => self.handle_resources_unsubscribe(&sid, request),
            methods::PROMPTS_LIST => self.handle_prompts_list(request),
            methods::PROMPTS_GET => self.handle_prompts_get(&sid, request).await,
            methods::LOGGING_SET_LEVEL => self.handle_logging_set_level(request),
            methods::COMPLETION_COMPLETE => self.handle_completion(request),
            other => request.id.map(|id| {
                to_value(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(error_codes::METHOD_NOT_FOUND, format!("unknown method '{other}'")),
                ))
            }),
        }
    }

    async fn handle_initialize(&self, session: &dyn TransportSession, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let params: InitializeParams = match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
            Ok(p) => p,
            Err(e) => {
                self.states.insert(sid.to_string(), SessionState::Terminated);
                return Some(to_value(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(error_codes::INVALID_PARAMS, format!("invalid initialize params: {e}")),
                )));
            }
        };

        let negotiated = ProtocolVersion::parse(&params.protocol_version).unwrap_or_else(|| {
            warn!(
                requested = %params.protocol_version,
                fallback = %ProtocolVersion::latest(),
                "client offered an unsupported protocol version, falling back to latest"
            );
            ProtocolVersion::latest()
        });

        let server_capabilities = self.config.implementation.derive_capabilities(negotiated);

        self.sessions.create_with_id(sid.to_string(), negotiated, params.capabilities.clone());
        session.set_negotiated_version(negotiated);
        session.store_client_capabilities(params.capabilities);
        session.initialize();
        self.states.insert(sid.to_string(), SessionState::Ready);

        let result = InitializeResult {
            protocol_version: negotiated.as_str().to_string(),
            server_info: Implementation {
                name: "protomcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: server_capabilities,
        };
        Some(to_value(JsonRpcResponse::success(id, serde_json::to_value(result).unwrap())))
    }

    fn handle_shutdown(&self, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        self.states.insert(sid.to_string(), SessionState::Draining);
        request.id.map(|id| to_value(JsonRpcResponse::success(id, Value::Null)))
    }

    async fn handle_exit(&self, sid: &str) {
        self.states.insert(sid.to_string(), SessionState::Terminated);
        self.teardown_session(sid).await;
    }

    async fn teardown_session(&self, sid: &str) {
        self.subscriptions.unsubscribe_all(sid);
        if let Some((_, ids)) = self.session_requests.remove(sid) {
            self.canceller.cancel_all(ids);
        }
        self.sessions.close(sid);
    }

    fn handle_cancelled(&self, ctx: RequestContext, request: JsonRpcRequest) {
        let Some(params) = request.params else { return };
        let request_id = params
            .get("requestId")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())));
        let reason = params.get("reason").and_then(Value::as_str);
        if let Some(rid) = request_id {
            debug!(session_id = %ctx.session_id, request_id = %rid, reason = ?reason, "cancelling request");
            self.canceller.cancel(&rid, reason);
        }
    }

    fn session_version(&self, sid: &str) -> ProtocolVersion {
        self.sessions.get(sid).map(|s| s.protocol_version).unwrap_or_else(ProtocolVersion::latest)
    }

    fn session_supports_subscribe(&self, sid: &str) -> bool {
        self.sessions
            .get(sid)
            .is_some_and(|s| s.client_capabilities.resources.subscribe)
    }

    fn track_request(&self, sid: &str, request_id: &str) {
        self.canceller.register(request_id);
        self.session_requests.entry(sid.to_string()).or_default().insert(request_id.to_string());
    }

    fn untrack_request(&self, sid: &str, request_id: &str) {
        self.canceller.deregister(request_id);
        if let Some(mut ids) = self.session_requests.get_mut(sid) {
            ids.remove(request_id);
        }
    }

    fn handle_tools_list(&self, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let cursor = request.params.as_ref().and_then(|p| p.get("cursor")).and_then(Value::as_str);
        let (tools, next_cursor) = self.registry.list_tools(cursor, LIST_PAGE_SIZE);
        let mut result = json!({ "tools": tools });
        if let Some(next) = next_cursor {
            result["nextCursor"] = Value::String(next);
        }
        Some(to_value(JsonRpcResponse::success(id, result)))
    }

    async fn handle_tools_call(&self, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let Some(params) = request.params else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "tools/call requires params"),
            )));
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "missing 'name'"),
            )));
        };
        let Some(handler) = self.registry.tool_handler(name) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::NOT_FOUND, format!("unknown tool '{name}'")),
            )));
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let request_id = id.to_string();
        self.track_request(sid, &request_id);
        let ctx = RequestContext::new(sid.to_string(), self.session_version(sid), request_id.clone());
        let outcome = guard_handler_panic(async move { handler.call(ctx, arguments).await }).await;
        self.untrack_request(sid, &request_id);

        match outcome {
            Ok(value) => Some(to_value(JsonRpcResponse::success(id, shape_tool_result(value, false)))),
            Err(ServerError::Protocol(core_err)) => {
                Some(to_value(JsonRpcResponse::failure(id, core_err.into())))
            }
            Err(other) => Some(to_value(JsonRpcResponse::success(
                id,
                shape_tool_result(Value::String(other.to_string()), true),
            ))),
        }
    }

    fn handle_resources_list(&self, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let cursor = request.params.as_ref().and_then(|p| p.get("cursor")).and_then(Value::as_str);
        let (resources, next_cursor) = self.registry.list_resources(cursor, LIST_PAGE_SIZE);
        let mut result = json!({ "resources": resources });
        if let Some(next) = next_cursor {
            result["nextCursor"] = Value::String(next);
        }
        Some(to_value(JsonRpcResponse::success(id, result)))
    }

    async fn handle_resources_read(&self, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let Some(uri) = request.params.as_ref().and_then(|p| p.get("uri")).and_then(Value::as_str) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "missing 'uri'"),
            )));
        };

        let request_id = id.to_string();
        self.track_request(sid, &request_id);
        let ctx = RequestContext::new(sid.to_string(), self.session_version(sid), request_id.clone());
        let outcome = match self.registry.resolve_resource(uri) {
            Some(ResourceResolution::Static(handler)) => {
                guard_handler_panic(async move { handler.read(ctx).await }).await
            }
            Some(ResourceResolution::Template(handler, vars)) => {
                guard_handler_panic(async move { handler.read(ctx, vars).await }).await
            }
            None => Err(ServerError::NotFound(format!("no resource matches uri '{uri}'"))),
        };
        self.untrack_request(sid, &request_id);

        match outcome {
            Ok(value) => Some(to_value(JsonRpcResponse::success(id, value))),
            Err(e) => Some(to_value(JsonRpcResponse::failure(id, e.into()))),
        }
    }

    fn handle_resources_subscribe(&self, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let Some(uri) = request.params.as_ref().and_then(|p| p.get("uri")).and_then(Value::as_str) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "missing 'uri'"),
            )));
        };
        if !self.session_supports_subscribe(sid) {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::CAPABILITY_VIOLATION, "session did not declare resources.subscribe capability"),
            )));
        }
        self.subscriptions.subscribe(uri, sid);
        Some(to_value(JsonRpcResponse::success(id, json!({}))))
    }

    fn handle_resources_unsubscribe(&self, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let Some(uri) = request.params.as_ref().and_then(|p| p.get("uri")).and_then(Value::as_str) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "missing 'uri'"),
            )));
        };
        if !self.session_supports_subscribe(sid) {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::CAPABILITY_VIOLATION, "session did not declare resources.subscribe capability"),
            )));
        }
        self.subscriptions.unsubscribe(uri, sid);
        Some(to_value(JsonRpcResponse::success(id, json!({}))))
    }

    fn handle_prompts_list(&self, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let cursor = request.params.as_ref().and_then(|p| p.get("cursor")).and_then(Value::as_str);
        let (prompts, next_cursor) = self.registry.list_prompts(cursor, LIST_PAGE_SIZE);
        let mut result = json!({ "prompts": prompts });
        if let Some(next) = next_cursor {
            result["nextCursor"] = Value::String(next);
        }
        Some(to_value(JsonRpcResponse::success(id, result)))
    }

    async fn handle_prompts_get(&self, sid: &str, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let Some(params) = request.params else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "prompts/get requires params"),
            )));
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::INVALID_PARAMS, "missing 'name'"),
            )));
        };
        let Some(handler) = self.registry.prompt_handler(name) else {
            return Some(to_value(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(error_codes::NOT_FOUND, format!("unknown prompt '{name}'")),
            )));
        };
        let arguments = params.get("arguments").cloned();

        let request_id = id.to_string();
        self.track_request(sid, &request_id);
        let ctx = RequestContext::new(sid.to_string(), self.session_version(sid), request_id.clone());
        let outcome = guard_handler_panic(async move { handler.get(ctx, arguments).await }).await;
        self.untrack_request(sid, &request_id);

        match outcome {
            Ok(value) => Some(to_value(JsonRpcResponse::success(id, value))),
            Err(e) => Some(to_value(JsonRpcResponse::failure(id, e.into()))),
        }
    }

    fn handle_logging_set_level(&self, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id?;
        let level = request.params.as_ref().and_then(|p| p.get("level")).and_then(Value::as_str).unwrap_or("info");
        // Recording only: the concrete effect on the logger is left
        // implementation-defined (spec §9 open question).
        debug!(level, "logging/set_level recorded");
        Some(to_value(JsonRpcResponse::success(id, json!({"success": true}))))
    }

    fn handle_completion(&self, request: JsonRpcRequest) -> Option<Value> {
        request.id.map(|id| to_value(JsonRpcResponse::success(id, json!({"items": []}))))
    }
}

fn to_value(response: JsonRpcResponse) -> Value {
    serde_json::to_value(&response).expect("JsonRpcResponse always serializes")
}

/// Shape a tool's return value into `{content, isError}` (spec §4.6 "Result
/// shaping is by run-time type").
fn shape_tool_result(value: Value, is_error: bool) -> Value {
    json!({ "content": shape_content(value), "isError": is_error })
}

fn shape_content(value: Value) -> Vec<Value> {
    match value {
        Value::String(s) => vec![json!({"type": "text", "text": s})],
        Value::Object(map) if map.contains_key("content") => match map.get("content") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => vec![],
        },
        Value::Object(map) if map.contains_key("imageUrl") || map.contains_key("url") || map.contains_key("mimeType") => {
            vec![shape_structured_content(&map)]
        }
        Value::Array(items) if items.iter().all(is_content_item) => items,
        other => vec![json!({"type": "text", "text": serde_json::to_string(&other).unwrap_or_default()})],
    }
}

fn shape_structured_content(map: &serde_json::Map<String, Value>) -> Value {
    if let Some(image_url) = map.get("imageUrl").and_then(Value::as_str) {
        json!({
            "type": "image",
            "imageUrl": image_url,
            "mimeType": map.get("mimeType").and_then(Value::as_str).unwrap_or("application/octet-stream"),
            "altText": map.get("altText").and_then(Value::as_str),
        })
    } else if let Some(url) = map.get("url").and_then(Value::as_str) {
        json!({
            "type": "link",
            "url": url,
            "title": map.get("title").and_then(Value::as_str),
        })
    } else {
        json!({
            "type": "file",
            "mimeType": map.get("mimeType").and_then(Value::as_str).unwrap_or("application/octet-stream"),
            "data": map.get("data").and_then(Value::as_str).unwrap_or(""),
            "filename": map.get("filename").and_then(Value::as_str),
        })
    }
}

fn is_content_item(v: &Value) -> bool {
    v.get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| matches!(t, "text" | "image" | "audio" | "link" | "file"))
}
