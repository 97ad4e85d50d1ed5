//! Speech-to-text trait definition.

use async_trait::async_trait;

/// Speech-to-text trait for transcribing audio to text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe audio bytes to text.
    ///
    /// # Arguments
    /// * `audio_bytes` - Raw audio data
    /// * `format` - Audio format hint (e.g., "ogg", "mp3", "wav")
    async fn transcribe(&self, audio_bytes: &[u8], format: &str) -> anyhow::Result<String>;

    /// Get the provider name.
    fn provider_name(&self) -> &str;
}
