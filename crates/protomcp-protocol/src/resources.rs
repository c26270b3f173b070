//! Static resources and resource templates (spec §3 "Resource", "Resource Template").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of content a static resource exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Inline text.
    Text,
    /// Inline binary data.
    Binary,
    /// Backed by a file path.
    File,
    /// Backed by a directory path.
    Directory,
    /// Backed by a remote URL.
    Url,
    /// Inline or referenced audio.
    Audio,
    /// A static, pre-computed value with no content-source indirection.
    Static,
}

/// Where a resource's bytes actually come from. Loading the bytes from any
/// of these sources is outside this core's scope (spec §1); the source is
/// carried here only as a tag the registered handler consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ContentSource {
    /// Content is embedded directly as a UTF-8 string.
    InlineText(String),
    /// Content is embedded directly as base64-encoded bytes.
    InlineBytes(String),
    /// Content is loaded from a file path by an external loader.
    FilePath(String),
    /// Content is loaded from a directory listing by an external loader.
    DirectoryPath(String),
    /// Content is fetched from a remote URL by an external loader.
    RemoteUrl(String),
}

/// What happens when a resource is registered under a URI that already has
/// an entry (spec §3: "Duplicate registration policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Reject the registration, leaving the existing entry untouched.
    Error,
    /// Silently keep the existing entry; the new registration is discarded.
    Ignore,
    /// Log a warning, then replace the existing entry.
    #[default]
    WarnReplace,
    /// Replace the existing entry with no log output.
    ReplaceSilent,
}

/// A registered static resource (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Primary URI — the uniqueness key.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resource kind.
    pub kind: ResourceKind,
    /// MIME type, if known.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Where the bytes come from.
    pub content_source: ContentSource,
    /// Custom metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Whether a template variable is a simple single-segment capture, a
/// wildcard multi-segment capture, or carries a default value substituted
/// when the variable is absent from the incoming URI (spec §3, §4.5).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariableBinding {
    /// Variable name as it appears inside `{...}` in the pattern.
    pub name: String,
    /// `true` if this variable captures the remainder of the path.
    pub wildcard: bool,
    /// Default value substituted when the variable is absent.
    pub default: Option<String>,
}

/// A registered resource template: a URI pattern with `{variable}` markers,
/// matched against incoming URIs by the URI template matcher (spec §3, §4.5).
#[derive(Debug, Clone)]
pub struct ResourceTemplate {
    /// The primary RFC-6570-like pattern string, e.g. `/files/{path*}`.
    pub pattern: String,
    /// Additional pattern strings that alias this same template (spec §3:
    /// "additional-uri aliases").
    pub aliases: Vec<String>,
    /// Declared name, surfaced in `resources/list` templates.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Per-variable binding metadata, in pattern order.
    pub variables: Vec<VariableBinding>,
    /// Policy applied when this template's name collides with an existing one.
    pub duplicate_policy: DuplicatePolicy,
}

impl ResourceTemplate {
    /// All pattern strings this template matches against, primary first.
    pub fn all_patterns(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.pattern.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_duplicate_policy_is_warn_replace() {
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::WarnReplace);
    }

    #[test]
    fn all_patterns_includes_aliases() {
        let tmpl = ResourceTemplate {
            pattern: "/files/{path}".into(),
            aliases: vec!["/docs/{path}".into()],
            name: "files".into(),
            description: None,
            variables: vec![],
            duplicate_policy: DuplicatePolicy::Error,
        };
        let patterns: Vec<&str> = tmpl.all_patterns().collect();
        assert_eq!(patterns, vec!["/files/{path}", "/docs/{path}"]);
    }
}
