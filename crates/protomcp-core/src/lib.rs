//! # ProtoMCP Core
//!
//! Wire-level primitives for the Model Context Protocol: the JSON-RPC 2.0
//! envelope, the unified error type, and the closed set of supported
//! protocol versions.
//!
//! ## Module organization
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 request/response/notification/error types.
//! - [`error`]: Error kind and the unified `Error` type, with JSON-RPC
//!   error-code mapping.
//! - [`version`]: `ProtocolVersion` and its per-version capability profile.

#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod jsonrpc;
pub mod version;

pub use error::{Error, ErrorKind, Result};
pub use jsonrpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use version::{ContentKind, ProtocolVersion, VersionProfile};

/// JSON-RPC version string carried on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC and MCP-reserved error codes.
pub mod error_codes {
    /// Invalid JSON was received by the server.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The requested method does not exist.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Start of the MCP-reserved domain error range (inclusive).
    pub const DOMAIN_RANGE_START: i32 = -32000;
    /// End of the MCP-reserved domain error range (inclusive).
    pub const DOMAIN_RANGE_END: i32 = -32099;

    /// A session attempted a non-`initialize` method before initializing.
    pub const NOT_INITIALIZED: i32 = -32001;
    /// A capability required for the requested operation was not declared.
    pub const CAPABILITY_VIOLATION: i32 = -32002;
    /// Sampling or another admission-controlled path rejected the request.
    pub const RATE_LIMITED: i32 = -32003;
    /// A named tool, resource, or prompt does not exist.
    pub const NOT_FOUND: i32 = -32004;
    /// A server-initiated request timed out with no graceful degradation.
    pub const SAMPLING_TIMEOUT: i32 = -32005;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonrpc_version_is_two_point_oh() {
        assert_eq!(JSONRPC_VERSION, "2.0");
    }

    #[test]
    fn domain_range_contains_reserved_codes() {
        assert!(error_codes::DOMAIN_RANGE_START >= error_codes::DOMAIN_RANGE_END);
        assert!(error_codes::NOT_INITIALIZED <= error_codes::DOMAIN_RANGE_START);
        assert!(error_codes::NOT_INITIALIZED >= error_codes::DOMAIN_RANGE_END);
    }
}
