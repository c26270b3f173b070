//! Sampling controller: server-initiated `sampling/createMessage` requests
//! (spec §4.7).
//!
//! Admission control mirrors the teacher's token-bucket rate limiter
//! (`ServerConfig`'s `RateLimiter`) but is reshaped around spec §4.7's two
//! independent caps: a global concurrency semaphore and a per-session
//! requests-per-minute window, both checked non-blockingly at admission.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use protomcp_core::version::ContentKind;
use protomcp_core::{Error as CoreError, ProtocolVersion};
use protomcp_protocol::capabilities::SamplingCapability;
use protomcp_protocol::{methods, Content, CreateMessageParams, CreateMessageResult};

use crate::config::SamplingConfig;
use crate::error::{ServerError, ServerResult};
use crate::tracker::RequestTracker;
use crate::transport::TransportSession;

/// Per-call overrides for [`SamplingController::request_sampling`]'s
/// defaults (spec §4.7 step 1).
#[derive(Debug, Clone, Default)]
pub struct SamplingOptions {
    /// Override the configured default timeout.
    pub timeout: Option<Duration>,
    /// Override the configured default retry budget.
    pub max_retries: Option<u32>,
    /// 0-10 priority, scaling the effective timeout (spec §4.7 "Priority policy").
    pub priority: Option<u8>,
    /// Skip the check that the session declared support for the content
    /// type being requested.
    pub ignore_capability: bool,
}

struct RateWindow {
    count: u32,
    window_start: Instant,
}

impl RateWindow {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }
}

/// Validates, rate-limits, sends, awaits, retries, and degrades
/// server-initiated sampling requests (spec §4.7).
pub struct SamplingController {
    config: SamplingConfig,
    tracker: RequestTracker,
    global_permits: Arc<Semaphore>,
    client_windows: DashMap<String, RateWindow>,
}

impl SamplingController {
    /// Build a controller from `config`, sharing `tracker` with the
    /// dispatch core so response-ingestion routing stays unified.
    pub fn new(config: SamplingConfig, tracker: RequestTracker) -> Self {
        let global_permits = Arc::new(Semaphore::new(config.max_concurrent_requests as usize));
        Self {
            config,
            tracker,
            global_permits,
            client_windows: DashMap::new(),
        }
    }

    /// Number of sampling requests currently admitted and in flight.
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent_requests as usize - self.global_permits.available_permits()
    }

    fn admit(&self, session_id: &str) -> ServerResult<tokio::sync::OwnedSemaphorePermit> {
        let permit = self
            .global_permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| ServerError::RateLimit("global concurrent sampling request cap reached".into()))?;

        if self.config.per_client_rate_limit {
            let mut window = self.client_windows.entry(session_id.to_string()).or_insert_with(RateWindow::new);
            if window.window_start.elapsed() > Duration::from_secs(60) {
                window.count = 0;
                window.window_start = Instant::now();
            }
            if window.count >= self.config.max_requests_per_minute {
                return Err(ServerError::RateLimit(format!(
                    "session '{session_id}' exceeded {} sampling requests/minute",
                    self.config.max_requests_per_minute
                )));
            }
            window.count += 1;
        }

        Ok(permit)
    }

    /// Ask `session`'s client to generate an assistant message (spec §4.7
    /// steps 1-12).
    pub async fn request_sampling(
        &self,
        session: &dyn TransportSession,
        version: ProtocolVersion,
        params: CreateMessageParams,
        options: SamplingOptions,
    ) -> ServerResult<CreateMessageResult> {
        let profile = version.profile();

        if params.max_tokens > profile.max_tokens || params.max_tokens > self.config.max_tokens_per_request {
            return Err(ServerError::handler(format!(
                "maxTokens {} exceeds the limit for protocol version {version}",
                params.max_tokens
            )));
        }

        let declared_sampling = session.client_capabilities().map(|c| c.sampling).unwrap_or_default();
        for message in &params.messages {
            let Some(kind) = content_kind(&message.content) else {
                return Err(ServerError::Protocol(CoreError::CapabilityViolation(
                    "sampling messages must carry text, image, or audio content".into(),
                )));
            };
            if !profile.supported_content.contains(&kind) {
                return Err(ServerError::Protocol(CoreError::CapabilityViolation(format!(
                    "protocol version {version} does not support {kind:?} content in sampling"
                ))));
            }
            if !options.ignore_capability && !declared_sampling.supports(kind) {
                return Err(ServerError::Protocol(CoreError::CapabilityViolation(format!(
                    "session did not declare sampling support for {kind:?}"
                ))));
            }
        }

        let permit = self.admit(session.session_id())?;

        let priority = options.priority.unwrap_or(self.config.default_priority);
        let mut timeout = options.timeout.unwrap_or_else(|| self.config.effective_timeout(priority));
        let mut retries_left = options.max_retries.unwrap_or(self.config.default_max_retries);
        let retry_interval = self.config.default_retry_interval;

        let outcome = loop {
            let id = self.tracker.next_id();
            let rx = self.tracker.add_request(id, timeout);
            let frame = json!({
                "jsonrpc": protomcp_core::JSONRPC_VERSION,
                "id": id,
                "method": methods::SAMPLING_CREATE_MESSAGE,
                "params": &params,
            });

            if let Err(e) = session.send_request(frame).await {
                self.tracker.remove_request(id);
                break Err(e);
            }

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(Ok(payload))) => match serde_json::from_value::<CreateMessageResult>(payload) {
                    Ok(result) => match content_kind(&result.content) {
                        Some(kind) if profile.supported_content.contains(&kind) => break Ok(result),
                        _ => {
                            break Err(ServerError::Protocol(CoreError::CapabilityViolation(
                                "client returned a content type unsupported by the negotiated protocol version"
                                    .into(),
                            )))
                        }
                    },
                    Err(e) => break Err(ServerError::handler(format!("malformed sampling result: {e}"))),
                },
                // A retryable application error (spec §4.7 step 11: 5xx-shaped
                // code, or a message mentioning timeout/rate-limit/
                // temporarily-unavailable/try-again) follows the same retry
                // schedule as a timeout, once the budget allows it.
                Ok(Ok(Err(remote_err))) if remote_err.is_retryable() && retries_left > 0 => {
                    retries_left -= 1;
                    timeout += retry_interval;
                    debug!(
                        session_id = session.session_id(),
                        retries_left,
                        error = %remote_err,
                        "retrying sampling request after a retryable remote error"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
                // Retryable but out of budget: treat like an exhausted timeout.
                Ok(Ok(Err(remote_err))) if remote_err.is_retryable() => {
                    if self.config.graceful_degradation {
                        warn!(
                            session_id = session.session_id(),
                            "sampling request exhausted its retry budget on a retryable remote error, degrading gracefully"
                        );
                        break Ok(CreateMessageResult::graceful_timeout());
                    }
                    break Err(ServerError::SamplingTimeout);
                }
                // Non-retryable application error: fail immediately without
                // spending retry budget.
                Ok(Ok(Err(remote_err))) => break Err(ServerError::handler(remote_err.to_string())),
                Ok(Err(_)) | Err(_) => {
                    if retries_left == 0 {
                        if self.config.graceful_degradation {
                            warn!(
                                session_id = session.session_id(),
                                "sampling request exhausted its retry budget, degrading gracefully"
                            );
                            break Ok(CreateMessageResult::graceful_timeout());
                        }
                        break Err(ServerError::SamplingTimeout);
                    }
                    retries_left -= 1;
                    timeout += retry_interval;
                    debug!(
                        session_id = session.session_id(),
                        retries_left, "retrying timed-out sampling request"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        };

        drop(permit);
        outcome
    }
}

fn content_kind(content: &Content) -> Option<ContentKind> {
    match content {
        Content::Text { .. } => Some(ContentKind::Text),
        Content::Image { .. } => Some(ContentKind::Image),
        Content::Audio { .. } => Some(ContentKind::Audio),
        Content::Link { .. } | Content::File { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::MemoryTransport;
    use protomcp_protocol::{ClientCapabilities, ModelPreferences, SamplingMessage};

    fn params(text: &str, max_tokens: u32) -> CreateMessageParams {
        CreateMessageParams {
            messages: vec![SamplingMessage {
                role: "user".into(),
                content: Content::text(text),
            }],
            model_preferences: ModelPreferences::default(),
            system_prompt: None,
            max_tokens,
        }
    }

    fn session_with_text_support(id: &str) -> MemoryTransport {
        let session = MemoryTransport::new(id);
        session.store_client_capabilities(ClientCapabilities {
            sampling: SamplingCapability {
                text_support: true,
                image_support: false,
                audio_support: false,
            },
            ..Default::default()
        });
        session
    }

    #[tokio::test]
    async fn rejects_max_tokens_above_profile_limit() {
        let controller = SamplingController::new(SamplingConfig::default(), RequestTracker::new());
        let session = session_with_text_support("s1");
        let result = controller
            .request_sampling(&session, ProtocolVersion::V2024_11_05, params("hi", 999_999), SamplingOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_content_type_without_declared_capability() {
        let controller = SamplingController::new(SamplingConfig::default(), RequestTracker::new());
        let session = MemoryTransport::new("s1");
        session.store_client_capabilities(ClientCapabilities::default());
        let result = controller
            .request_sampling(&session, ProtocolVersion::latest(), params("hi", 128), SamplingOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(ServerError::Protocol(CoreError::CapabilityViolation(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_round_trip_resolves_via_tracker() {
        let tracker = RequestTracker::new();
        let controller = Arc::new(SamplingController::new(SamplingConfig::default(), tracker.clone()));
        let session = Arc::new(session_with_text_support("s1"));

        let responder = {
            let tracker = tracker.clone();
            let sent = session.sent.clone();
            tokio::spawn(async move {
                loop {
                    tokio::task::yield_now().await;
                    let frame = { sent.lock().last().cloned() };
                    if let Some(frame) = frame {
                        if let Some(id) = frame.get("id").and_then(|v| v.as_i64()) {
                            let _ = tracker.resolve_request(
                                id,
                                Ok(serde_json::json!({"role": "assistant", "content": {"type": "text", "text": "hi"}})),
                            );
                            break;
                        }
                    }
                }
            })
        };

        let result = controller
            .request_sampling(session.as_ref(), ProtocolVersion::latest(), params("hi", 128), SamplingOptions::default())
            .await
            .unwrap();
        responder.await.unwrap();
        assert_eq!(result.role, "assistant");
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_remote_error_is_retried_then_succeeds() {
        let tracker = RequestTracker::new();
        let mut config = SamplingConfig::default();
        config.default_max_retries = 2;
        config.default_retry_interval = Duration::from_millis(10);
        let controller = Arc::new(SamplingController::new(config, tracker.clone()));
        let session = Arc::new(session_with_text_support("s1"));

        let responder = {
            let tracker = tracker.clone();
            let sent = session.sent.clone();
            tokio::spawn(async move {
                let mut answered_with_error = false;
                loop {
                    tokio::task::yield_now().await;
                    let frame = { sent.lock().last().cloned() };
                    let Some(id) = frame.and_then(|f| f.get("id").and_then(|v| v.as_i64())) else {
                        continue;
                    };
                    if !answered_with_error {
                        answered_with_error = tracker.resolve_request(
                            id,
                            Err(protomcp_core::Error::Remote {
                                code: 503,
                                message: "upstream overloaded".into(),
                            }),
                        );
                        continue;
                    }
                    let _ = tracker.resolve_request(
                        id,
                        Ok(serde_json::json!({"role": "assistant", "content": {"type": "text", "text": "hi"}})),
                    );
                    break;
                }
            })
        };

        let result = controller
            .request_sampling(session.as_ref(), ProtocolVersion::latest(), params("hi", 128), SamplingOptions::default())
            .await
            .unwrap();
        responder.await.unwrap();
        assert_eq!(result.role, "assistant");
    }

    #[tokio::test]
    async fn non_retryable_remote_error_fails_without_retrying() {
        let tracker = RequestTracker::new();
        let controller = Arc::new(SamplingController::new(SamplingConfig::default(), tracker.clone()));
        let session = Arc::new(session_with_text_support("s1"));

        let responder = {
            let tracker = tracker.clone();
            let sent = session.sent.clone();
            tokio::spawn(async move {
                loop {
                    tokio::task::yield_now().await;
                    let frame = { sent.lock().last().cloned() };
                    if let Some(id) = frame.and_then(|f| f.get("id").and_then(|v| v.as_i64())) {
                        let _ = tracker.resolve_request(
                            id,
                            Err(protomcp_core::Error::Remote {
                                code: -32001,
                                message: "client declined".into(),
                            }),
                        );
                        break;
                    }
                }
            })
        };

        let result = controller
            .request_sampling(session.as_ref(), ProtocolVersion::latest(), params("hi", 128), SamplingOptions::default())
            .await;
        responder.await.unwrap();
        assert!(matches!(result, Err(ServerError::Handler { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_graceful_degradation_returns_canned_response() {
        let mut config = SamplingConfig::default();
        config.default_max_retries = 0;
        config.default_timeout = Duration::from_millis(10);
        config.graceful_degradation = true;
        let controller = SamplingController::new(config, RequestTracker::new());
        let session = session_with_text_support("s1");

        let handle = tokio::spawn(async move {
            controller
                .request_sampling(&session, ProtocolVersion::latest(), params("hi", 128), SamplingOptions::default())
                .await
        });
        tokio::time::advance(Duration::from_millis(50)).await;
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.stop_reason.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn global_concurrency_cap_rejects_excess_requests() {
        let mut config = SamplingConfig::default();
        config.max_concurrent_requests = 1;
        config.default_timeout = Duration::from_secs(5);
        let controller = Arc::new(SamplingController::new(config, RequestTracker::new()));
        let permit = controller.global_permits.clone().try_acquire_owned().unwrap();
        let session = session_with_text_support("s1");
        let result = controller
            .request_sampling(&session, ProtocolVersion::latest(), params("hi", 128), SamplingOptions::default())
            .await;
        assert!(matches!(result, Err(ServerError::RateLimit(_))));
        drop(permit);
    }
}
