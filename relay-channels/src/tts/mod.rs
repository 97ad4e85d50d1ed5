//! Text-to-speech (TTS) module for voice replies.
//!
//! This module provides a trait-based abstraction for TTS services,
//! with an OpenAI implementation that also covers compatible providers.

mod openai;
mod traits;

pub use openai::OpenAiTts;
pub use traits::{AudioFormat, SynthesisOptions, TextToSpeech};

use std::sync::Arc;

/// Create a TTS provider based on the provider name.
///
/// # Arguments
/// * `provider` - Provider name: "openai" or "compatible"
/// * `api_key` - API key for the provider
/// * `model` - Optional model name
/// * `voice` - Optional default voice ID
/// * `base_url` - Base URL, required for "compatible"
pub fn create_tts(
    provider: &str,
    api_key: &str,
    model: Option<&str>,
    voice: Option<&str>,
    base_url: Option<&str>,
) -> anyhow::Result<Arc<dyn TextToSpeech>> {
    match provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiTts::with_base_url(
            api_key.to_string(),
            base_url.unwrap_or("https://api.openai.com"),
            model.map(ToString::to_string),
            voice.map(ToString::to_string),
        ))),
        "compatible" | "openai-compatible" => {
            let url = base_url.ok_or_else(|| {
                anyhow::anyhow!("base_url is required for 'compatible' TTS provider")
            })?;
            Ok(Arc::new(OpenAiTts::with_base_url(
                api_key.to_string(),
                url,
                model.map(ToString::to_string),
                voice.map(ToString::to_string),
            )))
        }
        _ => anyhow::bail!("Unsupported TTS provider: {provider}. Supported: openai, compatible"),
    }
}
