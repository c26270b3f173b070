//! Tool definitions (spec §3 "Tool").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON Schema document describing a tool's expected arguments. `None`
/// means the tool accepts opaque/free-form payloads and no schema is
/// synthesized (spec §4.5).
pub type ToolInputSchema = Option<serde_json::Value>;

/// A registered tool, as exposed over `tools/list` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema, or `null` for opaque payloads.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
    /// Free-form annotation map (spec §3: `annotations: mapping string→value`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, serde_json::Value>,
}

impl Tool {
    /// Build a tool with no schema (opaque-argument handler) and no annotations.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: None,
            annotations: HashMap::new(),
        }
    }

    /// Attach a synthesized input schema.
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_without_schema_omits_annotations_when_empty() {
        let tool = Tool::new("sum", "adds two numbers");
        let v = serde_json::to_value(&tool).unwrap();
        assert!(v.get("annotations").is_none());
        assert!(v["inputSchema"].is_null());
    }
}
