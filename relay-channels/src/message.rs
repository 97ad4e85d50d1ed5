//! Message types exchanged with the messaging client and the completion API.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Mimetype of a recorded voice note.
pub const VOICE_NOTE_MIMETYPE: &str = "audio/ogg; codecs=opus";

/// Conversation role of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation, tagged by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A message received by an automation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message ID assigned by the messaging client
    pub id: String,
    /// Sender address; replies go back here
    pub from: String,
    /// Text body (empty for pure media messages)
    #[serde(default)]
    pub body: String,
    /// Sent by the logged-in account itself
    #[serde(default)]
    pub from_me: bool,
    /// Originates from a group conversation
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub has_media: bool,
    /// Media mimetype when `has_media` is set
    #[serde(default)]
    pub mimetype: Option<String>,
}

impl InboundMessage {
    /// Check if the attached media is a voice note.
    pub fn is_voice_note(&self) -> bool {
        self.has_media && self.mimetype.as_deref() == Some(VOICE_NOTE_MIMETYPE)
    }
}

/// Downloaded media payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub mimetype: String,
    pub data: Vec<u8>,
    pub filename: Option<String>,
}

impl Media {
    pub fn new(mimetype: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mimetype: mimetype.into(),
            data,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Media data as standard base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Content sent back through the messaging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    Text(String),
    Media(Media),
}

impl OutgoingContent {
    /// Get the text if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Media(_) => None,
        }
    }
}

impl From<&str> for OutgoingContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for OutgoingContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_serializes_with_lowercase_role() {
        let json = serde_json::to_value(ChatTurn::assistant("OK")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "assistant", "content": "OK" }));
    }

    #[test]
    fn inbound_message_defaults_optional_fields() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{ "id": "m1", "from": "123@c.us", "body": "hi" }"#).unwrap();
        assert!(!msg.from_me);
        assert!(!msg.is_group);
        assert!(!msg.has_media);
        assert!(!msg.is_voice_note());
    }

    #[test]
    fn voice_note_requires_exact_mimetype() {
        let mut msg: InboundMessage =
            serde_json::from_str(r#"{ "id": "m1", "from": "u", "has_media": true }"#).unwrap();
        msg.mimetype = Some("audio/mpeg".into());
        assert!(!msg.is_voice_note());

        msg.mimetype = Some(VOICE_NOTE_MIMETYPE.into());
        assert!(msg.is_voice_note());
    }

    #[test]
    fn media_base64() {
        let media = Media::new("audio/mpeg", b"abc".to_vec()).with_filename("reply.mp3");
        assert_eq!(media.to_base64(), "YWJj");
        assert_eq!(media.filename.as_deref(), Some("reply.mp3"));
    }
}
