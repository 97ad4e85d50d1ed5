//! OpenAI TTS implementation.
//!
//! Uses the OpenAI Audio API (`tts-1`, `tts-1-hd`) for speech synthesis.

use super::{AudioFormat, SynthesisOptions, TextToSpeech};
use async_trait::async_trait;
use reqwest::Client;

/// OpenAI TTS API implementation.
pub struct OpenAiTts {
    api_key: String,
    client: Client,
    model: String,
    default_voice: String,
    base_url: String,
}

impl OpenAiTts {
    /// Create a new OpenAI TTS client.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (default: "tts-1")
    /// * `voice` - Default voice (default: "onyx")
    pub fn new(api_key: String, model: Option<String>, voice: Option<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com", model, voice)
    }

    /// Create with a custom base URL (for OpenAI-compatible providers).
    pub fn with_base_url(
        api_key: String,
        base_url: &str,
        model: Option<String>,
        voice: Option<String>,
    ) -> Self {
        Self {
            api_key,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            model: model.unwrap_or_else(|| "tts-1".to_string()),
            default_voice: voice.unwrap_or_else(|| "onyx".to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn format_to_response_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Wav => "wav",
        }
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    async fn synthesize(
        &self,
        text: &str,
        options: Option<SynthesisOptions>,
    ) -> anyhow::Result<Vec<u8>> {
        let opts = options.unwrap_or_default();
        let voice = opts.voice.as_deref().unwrap_or(&self.default_voice);

        let mut body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice,
            "response_format": Self::format_to_response_format(opts.format)
        });

        if let Some(speed) = opts.speed {
            body["speed"] = serde_json::json!(speed.clamp(0.25, 4.0));
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI TTS API error ({status}): {error_text}");
        }

        let bytes = response.bytes().await?;
        tracing::info!(
            chars = text.len(),
            bytes = bytes.len(),
            "OpenAI TTS synthesized reply"
        );

        Ok(bytes.to_vec())
    }

    fn default_voice(&self) -> &str {
        &self.default_voice
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
