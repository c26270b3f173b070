//! Unified error type, with JSON-RPC error-code mapping.

use crate::error_codes;
use crate::jsonrpc::JsonRpcError;

/// Result type alias used throughout ProtoMCP.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for protocol and session-level failures.
///
/// This does not attempt to cover handler-application errors (a tool that
/// fails on its own terms) — those are shaped into `isError: true` tool
/// results by the dispatch core, per spec, rather than raised as this type.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed JSON on the wire.
    #[error("parse error: {0}")]
    Parse(String),

    /// A well-formed but semantically invalid JSON-RPC envelope.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Params present but failed decoding against the handler's argument shape.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// A session attempted a non-`initialize` method before initializing.
    #[error("session not initialized")]
    NotInitialized,

    /// A declared capability is required but was not negotiated.
    #[error("capability violation: {0}")]
    CapabilityViolation(String),

    /// Admission control rejected the request (rate limit, concurrency cap).
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// A named tool/resource/prompt/session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A server-initiated request exhausted its retry budget with no
    /// graceful degradation configured.
    #[error("sampling request timed out")]
    SamplingTimeout,

    /// Catch-all for unexpected internal failure (e.g. a recovered panic).
    #[error("internal error: {0}")]
    Internal(String),

    /// An application-level error returned by the remote peer in response
    /// to a server-initiated request (e.g. a failed `sampling/createMessage`
    /// round trip), carrying the code the peer reported so retry policy can
    /// inspect it the same way as a protocol-level failure.
    #[error("remote error: {message} (code {code})")]
    Remote {
        /// The JSON-RPC code the peer reported.
        code: i32,
        /// The peer's error message.
        message: String,
    },
}

impl Error {
    /// The JSON-RPC error code this variant maps to.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::NotInitialized => error_codes::NOT_INITIALIZED,
            Self::CapabilityViolation(_) => error_codes::CAPABILITY_VIOLATION,
            Self::RateLimited(_) => error_codes::RATE_LIMITED,
            Self::NotFound(_) => error_codes::NOT_FOUND,
            Self::SamplingTimeout => error_codes::SAMPLING_TIMEOUT,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
            Self::Remote { code, .. } => *code,
        }
    }
}

impl From<Error> for JsonRpcError {
    fn from(err: Error) -> Self {
        JsonRpcError::new(err.code(), err.to_string())
    }
}

/// Error classification, exposed separately from [`Error`] for callers that
/// want to match on kind without destructuring the full variant (e.g. when
/// deciding whether a sampling failure is retryable per spec §4.7 step 11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport- or parse-level failure.
    Protocol,
    /// Lifecycle ordering violation.
    Lifecycle,
    /// Capability or authorization boundary.
    Capability,
    /// Resource exhaustion (rate limit, concurrency cap, timeout).
    Admission,
    /// Lookup failure.
    NotFound,
    /// Unclassified.
    Internal,
}

impl Error {
    /// Coarse classification, used by callers deciding retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) | Self::InvalidRequest(_) | Self::InvalidParams(_) => {
                ErrorKind::Protocol
            }
            Self::MethodNotFound(_) | Self::NotInitialized => ErrorKind::Lifecycle,
            Self::CapabilityViolation(_) => ErrorKind::Capability,
            Self::RateLimited(_) | Self::SamplingTimeout => ErrorKind::Admission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) | Self::Remote { .. } => ErrorKind::Internal,
        }
    }

    /// Whether a retryable-error message match applies (spec §4.7 step 11):
    /// a 5xx-shaped code, or a message mentioning timeout/rate-limit/
    /// temporary-unavailability/try-again.
    pub fn is_retryable(&self) -> bool {
        if (500..=599).contains(&self.code()) {
            return true;
        }
        let msg = self.to_string().to_ascii_lowercase();
        ["timeout", "rate limit", "temporarily unavailable", "try again"]
            .iter()
            .any(|needle| msg.contains(needle))
    }
}
