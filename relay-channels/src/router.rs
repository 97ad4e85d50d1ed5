//! Inbound event routing.
//!
//! Each accepted message is turned into one completion call against the
//! sender's windowed history, and the reply is sent back to the sender.
//! Collaborator failures never propagate: they are logged and answered with
//! the configured apology.

use crate::completion::ChatCompletion;
use crate::error::RelayError;
use crate::message::{ChatTurn, InboundMessage, OutgoingContent};
use crate::session::SessionContext;
use crate::voice::VoicePipeline;
use relay_common::logging::generate_trace_id;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Number of trailing turns sent with each completion call.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Upper bound on each collaborator call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_APOLOGY: &str = "⚠️ Sorry, something went wrong.";

/// Routes inbound messages of any session through the completion collaborator.
pub struct InboundRouter {
    completion: Arc<dyn ChatCompletion>,
    voice: Option<VoicePipeline>,
    apology: String,
    history_window: usize,
    call_timeout: Duration,
}

impl InboundRouter {
    pub fn new(completion: Arc<dyn ChatCompletion>) -> Self {
        Self {
            completion,
            voice: None,
            apology: DEFAULT_APOLOGY.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Enable voice notes: transcribe them and answer with synthesized audio.
    pub fn with_voice(mut self, voice: VoicePipeline) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = apology.into();
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.is_some()
    }

    pub fn apology(&self) -> &str {
        &self.apology
    }

    /// Whether a message should produce a reply at all.
    pub fn accepts(&self, message: &InboundMessage) -> bool {
        if message.from_me || message.is_group {
            return false;
        }
        if self.takes_voice(message) {
            return true;
        }
        !message.body.trim().is_empty()
    }

    fn takes_voice(&self, message: &InboundMessage) -> bool {
        self.voice.is_some() && message.is_voice_note()
    }

    /// Handle one inbound message for the given session.
    pub async fn handle(&self, ctx: &SessionContext, message: InboundMessage) {
        if !self.accepts(&message) {
            tracing::debug!(
                session_id = %ctx.id(),
                from_me = message.from_me,
                is_group = message.is_group,
                "Ignoring inbound message"
            );
            return;
        }

        let span = relay_common::message_span!(generate_trace_id(), ctx.id(), &message.from);
        self.route(ctx, &message).instrument(span).await;
    }

    async fn route(&self, ctx: &SessionContext, message: &InboundMessage) {
        let voice = self.voice.as_ref().filter(|_| message.is_voice_note());

        let text = match voice {
            Some(voice) => match self.transcribe(ctx, voice, message).await {
                Ok(text) => {
                    tracing::info!(chars = text.len(), "Voice note transcribed");
                    text
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Voice note transcription failed");
                    self.send_apology(ctx, &message.from).await;
                    return;
                }
            },
            None => message.body.clone(),
        };

        let reply = match self.converse(ctx, &message.from, text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Completion failed");
                self.send_apology(ctx, &message.from).await;
                return;
            }
        };

        let content = match voice {
            Some(voice) => match self.bounded("synthesis", voice.synthesize(&reply)).await {
                Ok(media) => OutgoingContent::Media(media),
                Err(e) => {
                    tracing::warn!(error = %e, "Reply synthesis failed");
                    self.send_apology(ctx, &message.from).await;
                    return;
                }
            },
            None => OutgoingContent::Text(reply),
        };

        self.send(ctx, &message.from, content).await;
    }

    /// Append the user turn, complete, and append the reply, all under the
    /// user's lock. History reads and clears for this user wait until the
    /// turn finishes, at most `call_timeout`.
    async fn converse(
        &self,
        ctx: &SessionContext,
        user_id: &str,
        text: String,
    ) -> Result<String, RelayError> {
        let user = ctx.users().user(user_id).await;
        let mut state = user.lock().await;

        state.push(ChatTurn::user(text));
        let prompt = ctx.prompt().await;
        let context = state.context(&prompt, self.history_window);

        let started = Instant::now();
        let result = self
            .bounded("completion", async {
                self.completion.complete(&context).await.map_err(RelayError::from)
            })
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let reply = result?;
        tracing::info!(
            provider = self.completion.name(),
            latency_ms,
            turns = context.len(),
            "Reply generated"
        );

        state.push(ChatTurn::assistant(reply.clone()));
        Ok(reply)
    }

    async fn transcribe(
        &self,
        ctx: &SessionContext,
        voice: &VoicePipeline,
        message: &InboundMessage,
    ) -> Result<String, RelayError> {
        let media = self
            .bounded("media download", async {
                ctx.client()
                    .download_media(message)
                    .await
                    .map_err(RelayError::from)
            })
            .await?
            .ok_or_else(|| RelayError::Transcription("voice note has no media".into()))?;

        self.bounded("transcription", voice.transcribe(&media)).await
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, RelayError>
    where
        F: Future<Output = Result<T, RelayError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout {
                operation,
                secs: self.call_timeout.as_secs(),
            }),
        }
    }

    async fn send_apology(&self, ctx: &SessionContext, to: &str) {
        self.send(ctx, to, OutgoingContent::Text(self.apology.clone()))
            .await;
    }

    async fn send(&self, ctx: &SessionContext, to: &str, content: OutgoingContent) {
        let kind = match &content {
            OutgoingContent::Text(_) => "text",
            OutgoingContent::Media(_) => "media",
        };
        match ctx.client().send_message(to, content).await {
            Ok(()) => tracing::debug!(kind, "Reply sent"),
            Err(e) => {
                let err = RelayError::from(e);
                tracing::warn!(kind, error = %err, "Failed to send reply");
            }
        }
    }
}
