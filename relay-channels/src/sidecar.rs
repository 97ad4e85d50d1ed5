//! Automation sidecar client.
//!
//! The browser automation runs in a separate sidecar process. The relay
//! drives it over HTTP and the sidecar pushes login and message events back
//! to `POST /webhooks/sidecar/{session_id}`.

use crate::message::{InboundMessage, Media, OutgoingContent};
use crate::traits::{ChannelError, ChannelResult, ClientEvent, ClientFactory, EventSender, MessagingClient};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Path the sidecar posts events to, relative to the relay's public URL.
pub fn webhook_path(session_id: &str) -> String {
    format!("/webhooks/sidecar/{session_id}")
}

/// Media as exchanged with the sidecar: base64 data plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mimetype: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl MediaPayload {
    pub fn decode(self) -> ChannelResult<Media> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ChannelError::MediaFailed(format!("invalid base64 media: {e}")))?;
        let media = Media::new(self.mimetype, data);
        Ok(match self.filename {
            Some(filename) => media.with_filename(filename),
            None => media,
        })
    }
}

impl From<&Media> for MediaPayload {
    fn from(media: &Media) -> Self {
        Self {
            mimetype: media.mimetype.clone(),
            data: media.to_base64(),
            filename: media.filename.clone(),
        }
    }
}

/// Event body posted by the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarEvent {
    Qr {
        code: String,
        /// Rendered PNG, plain base64 or a `data:` URL
        #[serde(default)]
        image: Option<String>,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    Message(InboundMessage),
}

impl SidecarEvent {
    pub fn into_client_event(self) -> ChannelResult<ClientEvent> {
        Ok(match self {
            Self::Qr { code, image } => ClientEvent::Qr {
                code,
                image: image.as_deref().map(decode_png).transpose()?,
            },
            Self::Ready => ClientEvent::Ready,
            Self::Disconnected { reason } => ClientEvent::Disconnected { reason },
            Self::Message(message) => ClientEvent::Message(message),
        })
    }
}

fn decode_png(image: &str) -> ChannelResult<Vec<u8>> {
    let encoded = image
        .strip_prefix("data:image/png;base64,")
        .unwrap_or(image);
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ChannelError::InvalidEvent(format!("QR image is not base64: {e}")))
}

/// One sidecar-hosted login.
pub struct SidecarClient {
    client: Client,
    base_url: String,
    session_id: String,
    webhook_url: String,
}

impl SidecarClient {
    pub fn new(client: Client, base_url: &str, session_id: &str, webhook_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            webhook_url,
        }
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    fn session_url(&self) -> String {
        format!("{}/sessions/{}", self.base_url, self.session_id)
    }
}

#[async_trait]
impl MessagingClient for SidecarClient {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    async fn initialize(&self) -> ChannelResult<()> {
        let body = serde_json::json!({
            "session_id": self.session_id,
            "webhook_url": self.webhook_url,
        });

        let resp = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("sidecar unreachable: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Connection(format!(
                "sidecar refused session ({status}): {text}"
            )));
        }

        tracing::debug!(session_id = %self.session_id, "Sidecar login started");
        Ok(())
    }

    async fn send_message(&self, to: &str, content: OutgoingContent) -> ChannelResult<()> {
        let body = match &content {
            OutgoingContent::Text(text) => serde_json::json!({ "to": to, "text": text }),
            OutgoingContent::Media(media) => {
                serde_json::json!({ "to": to, "media": MediaPayload::from(media) })
            }
        };

        let resp = self
            .client
            .post(format!("{}/messages", self.session_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed(format!("sidecar send error: {e}")))?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(ChannelError::NotReady),
            status => {
                let text = resp.text().await.unwrap_or_default();
                Err(ChannelError::SendFailed(format!("sidecar returned {status}: {text}")))
            }
        }
    }

    async fn download_media(&self, message: &InboundMessage) -> ChannelResult<Option<Media>> {
        if !message.has_media {
            return Ok(None);
        }

        let resp = self
            .client
            .get(format!("{}/messages/{}/media", self.session_url(), message.id))
            .send()
            .await
            .map_err(|e| ChannelError::MediaFailed(format!("sidecar download error: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ChannelError::MediaFailed(format!(
                "sidecar returned {status}: {text}"
            )));
        }

        let payload: MediaPayload = resp
            .json()
            .await
            .map_err(|e| ChannelError::MediaFailed(format!("invalid media response: {e}")))?;
        payload.decode().map(Some)
    }

    async fn destroy(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .delete(self.session_url())
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("sidecar unreachable: {e}")))?;

        // Already gone on the sidecar side.
        if resp.status() == StatusCode::NOT_FOUND || resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Err(ChannelError::Internal(format!(
            "sidecar teardown failed ({status}): {text}"
        )))
    }
}

/// Creates a [`SidecarClient`] per session, all sharing one HTTP pool.
pub struct SidecarFactory {
    client: Client,
    base_url: String,
    webhook_base: String,
}

impl SidecarFactory {
    /// `webhook_base` is the URL the sidecar can reach this relay at.
    pub fn new(base_url: &str, webhook_base: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            webhook_base: webhook_base.trim_end_matches('/').to_string(),
        }
    }
}

impl ClientFactory for SidecarFactory {
    fn create(
        &self,
        session_id: &str,
        _events: EventSender,
    ) -> ChannelResult<Arc<dyn MessagingClient>> {
        // Events arrive through the webhook route, which looks up the
        // session's sender in the registry.
        let webhook_url = format!("{}{}", self.webhook_base, webhook_path(session_id));
        Ok(Arc::new(SidecarClient::new(
            self.client.clone(),
            &self.base_url,
            session_id,
            webhook_url,
        )))
    }
}
