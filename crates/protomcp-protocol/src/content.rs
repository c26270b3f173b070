//! Content blocks returned from tool calls, resource reads, and sampling.

use serde::{Deserialize, Serialize};

/// A single unit of content, tagged by `type` on the wire (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// An image, either inline or by URL.
    Image {
        /// Direct URL to the image, if not inlined.
        #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        /// Base64-encoded inline image data, if not by URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Accessibility text.
        #[serde(rename = "altText", skip_serializing_if = "Option::is_none")]
        alt_text: Option<String>,
    },
    /// Audio content, always inline.
    Audio {
        /// Base64-encoded audio data.
        data: String,
        /// MIME type of the audio.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// A hyperlink to externally addressable content.
    Link {
        /// Target URL.
        url: String,
        /// Optional display title.
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// A file, inline.
    File {
        /// MIME type of the file.
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Base64-encoded file data.
        data: String,
        /// Suggested file name.
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

impl Content {
    /// Shorthand for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}
