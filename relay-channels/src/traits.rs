//! Messaging client traits for automation session adapters.

use crate::message::{InboundMessage, Media, OutgoingContent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result type for messaging client operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Messaging client error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Media download failed: {0}")]
    MediaFailed(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Client not ready")]
    NotReady,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Event emitted by a messaging client during its lifetime.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A login QR code is pending. `image` is a rendered PNG when available.
    Qr { code: String, image: Option<Vec<u8>> },
    /// Login completed; the client can send and receive.
    Ready,
    /// The login ended on the client side.
    Disconnected { reason: Option<String> },
    /// A message arrived.
    Message(InboundMessage),
}

impl ClientEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Qr { .. } => "qr",
            Self::Ready => "ready",
            Self::Disconnected { .. } => "disconnected",
            Self::Message(_) => "message",
        }
    }
}

/// Sending half of a session's event stream.
pub type EventSender = mpsc::Sender<ClientEvent>;

/// A stateful, browser-automated messaging login.
///
/// Events are not returned from these methods; the client pushes them into
/// the [`EventSender`] it was created with (or the session's sender is fed by
/// an external webhook).
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Get the client adapter name.
    fn name(&self) -> &'static str;

    /// Start the login. QR and ready events follow asynchronously.
    async fn initialize(&self) -> ChannelResult<()>;

    /// Send text or media to an address.
    async fn send_message(&self, to: &str, content: OutgoingContent) -> ChannelResult<()>;

    /// Fetch the media attached to a message, if any.
    async fn download_media(&self, message: &InboundMessage) -> ChannelResult<Option<Media>>;

    /// Tear the login down. Resolves once teardown was accepted.
    async fn destroy(&self) -> ChannelResult<()>;
}

/// Constructs one messaging client per session.
pub trait ClientFactory: Send + Sync {
    /// Build the client for `session_id`.
    ///
    /// Clients that produce their own events push them into `events`.
    /// Webhook-driven factories may drop it: their events reach the session
    /// through [`SessionRegistry::event_sender`](crate::SessionRegistry::event_sender).
    fn create(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> ChannelResult<Arc<dyn MessagingClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds() {
        assert_eq!(ClientEvent::Ready.kind(), "ready");
        assert_eq!(
            ClientEvent::Qr {
                code: "2@abc".into(),
                image: None
            }
            .kind(),
            "qr"
        );
        assert_eq!(
            ClientEvent::Disconnected { reason: None }.kind(),
            "disconnected"
        );
    }

    #[test]
    fn error_display() {
        let err = ChannelError::SendFailed("timeout".into());
        assert_eq!(err.to_string(), "Message send failed: timeout");
    }
}
