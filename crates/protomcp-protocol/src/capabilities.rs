//! Capability negotiation types for the `initialize` handshake (spec §3, §4.6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use protomcp_core::version::ContentKind;
use protomcp_core::ProtocolVersion;

/// Name/version identity of a client or server implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

/// `resources` sub-capability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourcesCapability {
    /// Client/server supports `resources/subscribe` and `/unsubscribe`.
    #[serde(default)]
    pub subscribe: bool,
    /// Server emits `notifications/resources/list_changed`.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// `prompts` sub-capability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptsCapability {
    /// Server emits `notifications/prompts/list_changed`.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// `tools` sub-capability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolsCapability {
    /// Server emits `notifications/tools/list_changed`.
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// `sampling` sub-capability: which content types a client can consume in a
/// `sampling/createMessage` result (spec §3, §4.7 step 2).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SamplingCapability {
    /// Client can render text sampling results.
    #[serde(rename = "textSupport", default)]
    pub text_support: bool,
    /// Client can render image sampling results.
    #[serde(rename = "imageSupport", default)]
    pub image_support: bool,
    /// Client can render audio sampling results.
    #[serde(rename = "audioSupport", default)]
    pub audio_support: bool,
}

impl SamplingCapability {
    /// Whether this capability set declares support for `kind`.
    pub fn supports(&self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Text => self.text_support,
            ContentKind::Image => self.image_support,
            ContentKind::Audio => self.audio_support,
        }
    }
}

/// Capabilities a client declares in `initialize` params (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Resource-related capabilities.
    #[serde(default)]
    pub resources: ResourcesCapability,
    /// Prompt-related capabilities.
    #[serde(default)]
    pub prompts: PromptsCapability,
    /// Tool-related capabilities.
    #[serde(default)]
    pub tools: ToolsCapability,
    /// Presence (not content) signals support for `logging/set_level`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<serde_json::Value>,
    /// Presence signals support for the completion placeholder method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<serde_json::Value>,
    /// Presence signals the client understands authorization flows; auth
    /// enforcement itself is out of scope for this core (spec §1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<serde_json::Value>,
    /// Sampling content-type support.
    #[serde(default)]
    pub sampling: SamplingCapability,
}

/// Capabilities the server advertises back in `initialize`'s result,
/// filtered by negotiated version (spec §4.6: "logging/completions/
/// authorization are only advertised under current version").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Resource-related capabilities.
    #[serde(default)]
    pub resources: ResourcesCapability,
    /// Prompt-related capabilities.
    #[serde(default)]
    pub prompts: PromptsCapability,
    /// Tool-related capabilities.
    #[serde(default)]
    pub tools: ToolsCapability,
    /// Present only when the version negotiated supports it and the server
    /// implements logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<serde_json::Value>,
    /// Present only when the version negotiated supports it and the server
    /// implements completions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions: Option<serde_json::Value>,
}

/// Flags describing which optional server features are implemented,
/// consulted when deriving [`ServerCapabilities`] during `initialize`
/// (spec §4.6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ServerImplementationFlags {
    /// Server supports `resources/subscribe`.
    #[serde(default)]
    pub resource_subscription: bool,
    /// Server emits list-changed notifications for resources.
    #[serde(default)]
    pub resources_list_changed: bool,
    /// Server emits list-changed notifications for tools.
    #[serde(default)]
    pub tools_list_changed: bool,
    /// Server emits list-changed notifications for prompts.
    #[serde(default)]
    pub prompts_list_changed: bool,
    /// Server implements `logging/set_level`.
    #[serde(default)]
    pub logging: bool,
    /// Server implements the completion placeholder method.
    #[serde(default)]
    pub completions: bool,
}

impl ServerImplementationFlags {
    /// Derive [`ServerCapabilities`], filtering version-gated flags per
    /// spec §4.6.
    pub fn derive_capabilities(&self, version: ProtocolVersion) -> ServerCapabilities {
        let current_only = version.advertises_current_only_flags();
        ServerCapabilities {
            resources: ResourcesCapability {
                subscribe: self.resource_subscription,
                list_changed: self.resources_list_changed,
            },
            prompts: PromptsCapability {
                list_changed: self.prompts_list_changed,
            },
            tools: ToolsCapability {
                list_changed: self.tools_list_changed,
            },
            logging: (current_only && self.logging).then(|| serde_json::json!({})),
            completions: (current_only && self.completions).then(|| serde_json::json!({})),
        }
    }
}

/// `initialize` request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version the client prefers.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client identity.
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
    /// Capabilities the client declares.
    #[serde(default)]
    pub capabilities: ClientCapabilities,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// The version the server actually negotiated.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Capabilities filtered for the negotiated version.
    pub capabilities: ServerCapabilities,
}

/// Free-form metadata map carried on a session (spec §3).
pub type Metadata = HashMap<String, serde_json::Value>;
