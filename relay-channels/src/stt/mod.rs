//! Speech-to-text (STT) module for voice message transcription.
//!
//! This module provides a trait-based abstraction for STT services,
//! with an implementation for OpenAI Whisper and OpenAI-compatible servers.

mod openai;
mod traits;

pub use openai::OpenAiStt;
pub use traits::SpeechToText;

use std::sync::Arc;

/// Create an STT provider based on the provider name.
///
/// # Arguments
/// * `provider` - Provider name: "openai", "compatible" or "local"
/// * `api_key` - API key for the provider (may be empty for local servers)
/// * `model` - Optional model name
/// * `base_url` - Base URL, required for "compatible" and "local"
pub fn create_stt(
    provider: &str,
    api_key: &str,
    model: Option<&str>,
    base_url: Option<&str>,
) -> anyhow::Result<Arc<dyn SpeechToText>> {
    match provider.to_lowercase().as_str() {
        "openai" | "whisper" => Ok(Arc::new(OpenAiStt::with_base_url(
            api_key.to_string(),
            base_url.unwrap_or("https://api.openai.com"),
            model.map(ToString::to_string),
        ))),
        "compatible" | "openai-compatible" | "local" => {
            let url = base_url.ok_or_else(|| {
                anyhow::anyhow!("base_url is required for '{provider}' STT provider")
            })?;
            Ok(Arc::new(OpenAiStt::with_base_url(
                api_key.to_string(),
                url,
                model.map(ToString::to_string),
            )))
        }
        _ => anyhow::bail!(
            "Unsupported STT provider: {provider}. Supported: openai, compatible, local"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_openai_stt() {
        let stt = create_stt("openai", "sk-test", None, None).unwrap();
        assert_eq!(stt.provider_name(), "openai");
    }

    #[test]
    fn create_case_insensitive() {
        assert!(create_stt("OpenAI", "key", None, None).is_ok());
        assert!(create_stt("WHISPER", "key", Some("whisper-1"), None).is_ok());
    }

    #[test]
    fn create_local_requires_base_url() {
        let err = create_stt("local", "", None, None).err().expect("expected error");
        assert!(err.to_string().contains("base_url is required"));
        assert!(create_stt("local", "", Some("base"), Some("http://localhost:8000")).is_ok());
    }

    #[test]
    fn create_unsupported_fails() {
        let err = create_stt("unsupported", "key", None, None)
            .err()
            .expect("expected error");
        assert!(err.to_string().contains("Unsupported"));
    }
}
