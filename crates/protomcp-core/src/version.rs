//! Protocol version negotiation and per-version capability profiles.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The closed set of protocol versions this implementation understands,
/// newest first. `initialize` negotiation (spec §4.6) walks the client's
/// offered versions against this set, falling back to [`ProtocolVersion::latest`]
/// when nothing offered is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Unstable draft channel.
    #[serde(rename = "draft")]
    Draft,
    /// `2024-11-05` stable release.
    #[serde(rename = "2024-11-05")]
    V2024_11_05,
    /// `2025-03-26` stable release, current default.
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
}

impl ProtocolVersion {
    /// All supported versions, newest first.
    pub const ALL: [ProtocolVersion; 3] = [
        ProtocolVersion::Draft,
        ProtocolVersion::V2025_03_26,
        ProtocolVersion::V2024_11_05,
    ];

    /// The version negotiated when nothing the client offered is supported.
    pub fn latest() -> Self {
        ProtocolVersion::V2025_03_26
    }

    /// Parse the wire string form, returning `None` for anything outside
    /// the closed set (the caller falls back to [`Self::latest`]).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "2024-11-05" => Some(Self::V2024_11_05),
            "2025-03-26" => Some(Self::V2025_03_26),
            _ => None,
        }
    }

    /// Wire string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::V2024_11_05 => "2024-11-05",
            Self::V2025_03_26 => "2025-03-26",
        }
    }

    /// The capability/sampling profile for this version.
    pub fn profile(&self) -> VersionProfile {
        match self {
            Self::Draft => VersionProfile {
                max_tokens: 16_384,
                supported_content: [ContentKind::Text, ContentKind::Image, ContentKind::Audio]
                    .into_iter()
                    .collect(),
                streaming_supported: true,
            },
            Self::V2025_03_26 => VersionProfile {
                max_tokens: 8_192,
                supported_content: [ContentKind::Text, ContentKind::Image, ContentKind::Audio]
                    .into_iter()
                    .collect(),
                streaming_supported: false,
            },
            Self::V2024_11_05 => VersionProfile {
                max_tokens: 4_096,
                supported_content: [ContentKind::Text, ContentKind::Image].into_iter().collect(),
                streaming_supported: false,
            },
        }
    }

    /// Whether this version advertises logging/completions/authorization
    /// capability flags (spec §4.6: "only advertised under current version").
    pub fn advertises_current_only_flags(&self) -> bool {
        matches!(self, Self::V2025_03_26 | Self::Draft)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sampling content-type tag, used both in the version profile and in
/// client-declared sampling capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text content.
    Text,
    /// Image content.
    Image,
    /// Audio content.
    Audio,
}

/// Per-version limits consulted during sampling validation and capability
/// filtering (spec §3 "Protocol Version", §4.7 step 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProfile {
    /// Maximum `maxTokens` a sampling request may ask for under this version.
    pub max_tokens: u32,
    /// Content types this version's sampling result may carry.
    pub supported_content: HashSet<ContentKind>,
    /// Whether this version supports streaming sampling responses.
    pub streaming_supported: bool,
}
