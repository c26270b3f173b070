//! Prompt definitions (spec §3 "Prompt").

use serde::{Deserialize, Serialize};

/// A registered prompt, keyed by URI if present, else by name (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Optional URI key. When present, takes precedence over `name` for
    /// uniqueness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Prompt name — the fallback uniqueness key when `uri` is absent.
    pub name: String,
    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// JSON Schema describing accepted arguments.
    #[serde(rename = "argumentsSchema", skip_serializing_if = "Option::is_none")]
    pub arguments_schema: Option<serde_json::Value>,
}

impl Prompt {
    /// The key this prompt is registered under: its URI if present,
    /// otherwise its name.
    pub fn key(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.name)
    }
}
