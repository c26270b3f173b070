//! Server-level error types.

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised by the session/registry/dispatch/sampling core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Wraps a protocol-layer error (parse/invalid/lifecycle/capability/etc).
    #[error(transparent)]
    Protocol(#[from] protomcp_core::Error),

    /// Handler registration or invocation failure not otherwise classified.
    #[error("handler error: {message}")]
    Handler {
        /// Error message.
        message: String,
        /// Optional context, e.g. the tool/resource/prompt name.
        context: Option<String>,
    },

    /// Configuration was invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// No registered handler matched the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit or concurrency admission control rejected the request.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// A server-initiated request exhausted its retry budget.
    #[error("sampling request timed out")]
    SamplingTimeout,

    /// Session lifecycle ordering was violated (spec §4.6).
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl ServerError {
    /// Build a handler error with no additional context.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            context: None,
        }
    }

    /// Attach context to a handler error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if let Self::Handler { context: ctx, .. } = &mut self {
            *ctx = Some(context.into());
        }
        self
    }
}

impl From<ServerError> for protomcp_core::jsonrpc::JsonRpcError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Protocol(e) => e.into(),
            ServerError::Handler { message, .. } => {
                Self::new(protomcp_core::error_codes::INTERNAL_ERROR, message)
            }
            ServerError::Configuration { message } => {
                Self::new(protomcp_core::error_codes::INTERNAL_ERROR, message)
            }
            ServerError::NotFound(what) => {
                Self::new(protomcp_core::error_codes::NOT_FOUND, format!("not found: {what}"))
            }
            ServerError::RateLimit(reason) => {
                Self::new(protomcp_core::error_codes::RATE_LIMITED, reason)
            }
            ServerError::SamplingTimeout => Self::new(
                protomcp_core::error_codes::SAMPLING_TIMEOUT,
                "sampling request timed out",
            ),
            ServerError::Lifecycle(reason) => {
                Self::new(protomcp_core::error_codes::INVALID_REQUEST, reason)
            }
        }
    }
}
