//! `sampling/createMessage` request/result types (spec §4.7, §6).

use serde::{Deserialize, Serialize};

use crate::content::Content;

/// A single message in the conversation handed to the client LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    /// Message content.
    pub content: Content,
}

/// Soft hints about which model the server would prefer the client use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPreferences {
    /// Preferred model name hints, most-preferred first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    /// 0.0-1.0 weighting toward cost.
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// 0.0-1.0 weighting toward speed.
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// 0.0-1.0 weighting toward output quality.
    #[serde(rename = "intelligencePriority", skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// Params for a server-initiated `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageParams {
    /// Conversation so far.
    pub messages: Vec<SamplingMessage>,
    /// Model preference hints.
    #[serde(rename = "modelPreferences", default)]
    pub model_preferences: ModelPreferences,
    /// System prompt override.
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Maximum tokens the client's model may generate.
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
}

/// Result of a `sampling/createMessage` round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageResult {
    /// Always `"assistant"` for a successful generation.
    pub role: String,
    /// Generated content.
    pub content: Content,
    /// Model name that actually produced the content, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Why generation stopped, e.g. `"endTurn"`, `"maxTokens"`, `"timeout"`.
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl CreateMessageResult {
    /// The canned degraded response returned when a sampling request times
    /// out with retries exhausted and graceful degradation enabled
    /// (spec §4.7 step 10, scenario 6).
    pub fn graceful_timeout() -> Self {
        Self {
            role: "assistant".into(),
            content: Content::text("I apologize, but I was unable to generate a response in time."),
            model: None,
            stop_reason: Some("timeout".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_timeout_has_timeout_stop_reason() {
        let result = CreateMessageResult::graceful_timeout();
        assert_eq!(result.stop_reason.as_deref(), Some("timeout"));
        assert_eq!(result.role, "assistant");
    }
}
