//! Vendor-neutral chat message shapes. Provider adapters translate these
//! to and from each vendor's wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(with = "image_bytes")]
        data: Vec<u8>,
        mime: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ContentPart {
    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. })
    }
}

/// Serialize image bytes as base64 so serialized messages stay printable.
mod image_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.parts.push(ContentPart::Text { text: text.into() });
    }

    pub fn push_image(&mut self, data: Vec<u8>, mime: impl Into<String>) {
        self.parts.push(ContentPart::Image {
            data,
            mime: mime.into(),
            detail: None,
        });
    }

    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_image()).count()
    }

    /// Concatenated text parts; used when a provider wants a plain string.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Splits a thinking-mode response of the shape
/// `<thoughts>…</thoughts>\n<answer>…</answer>` into (thoughts, answer).
/// If the tags are absent the whole response is the answer.
pub fn split_thinking(response: &str) -> (Option<String>, String) {
    let thoughts = response
        .split_once("<thoughts>")
        .and_then(|(_, rest)| rest.split_once("</thoughts>"))
        .map(|(inner, _)| inner.trim().to_string());

    let answer = response
        .split_once("<answer>")
        .and_then(|(_, rest)| rest.split_once("</answer>"))
        .map(|(inner, _)| inner.trim().to_string());

    match (thoughts, answer) {
        (t, Some(a)) => (t, a),
        (Some(t), None) => {
            // Tagged thoughts but no answer tag: treat the remainder as answer.
            let after = response
                .split_once("</thoughts>")
                .map(|(_, rest)| rest.trim().to_string())
                .unwrap_or_default();
            (Some(t), after)
        }
        (None, None) => (None, response.trim().to_string()),
    }
}
