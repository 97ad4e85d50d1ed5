use super::traits::SpeechToText;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

/// `OpenAI` Whisper API implementation for speech-to-text.
///
/// Also serves OpenAI-compatible transcription servers through a custom base URL.
pub struct OpenAiStt {
    api_key: String,
    client: Client,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiStt {
    /// Create a new `OpenAI` STT client.
    ///
    /// # Arguments
    /// * `api_key` - `OpenAI` API key
    /// * `model` - Model name (default: "whisper-1")
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com", model)
    }

    /// Create with a custom base URL (for OpenAI-compatible providers).
    pub fn with_base_url(api_key: String, base_url: &str, model: Option<String>) -> Self {
        Self {
            api_key,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            model: model.unwrap_or_else(|| "whisper-1".to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[allow(clippy::match_same_arms)] // Keep explicit patterns for documentation
    fn get_mime_type(format: &str) -> &'static str {
        match format.to_lowercase().as_str() {
            "ogg" | "oga" => "audio/ogg",
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "m4a" => "audio/m4a",
            "webm" => "audio/webm",
            _ => "audio/ogg", // voice notes
        }
    }

    #[allow(clippy::match_same_arms)]
    fn get_file_extension(format: &str) -> &'static str {
        match format.to_lowercase().as_str() {
            "ogg" | "oga" => "ogg",
            "mp3" => "mp3",
            "wav" => "wav",
            "m4a" => "m4a",
            "webm" => "webm",
            _ => "ogg",
        }
    }
}

#[async_trait]
impl SpeechToText for OpenAiStt {
    async fn transcribe(&self, audio_bytes: &[u8], format: &str) -> anyhow::Result<String> {
        if audio_bytes.is_empty() {
            anyhow::bail!("Cannot transcribe empty audio data");
        }

        let mime_type = Self::get_mime_type(format);
        let filename = format!("voice.{}", Self::get_file_extension(format));

        let part = Part::bytes(audio_bytes.to_vec())
            .file_name(filename)
            .mime_str(mime_type)?;

        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Whisper API error ({status}): {error_text}");
        }

        let transcription: TranscriptionResponse = response.json().await?;
        Ok(transcription.text)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn creates_with_default_model() {
        let stt = OpenAiStt::new("sk-test".to_string(), None);
        assert_eq!(stt.model, "whisper-1");
        assert_eq!(stt.base_url, "https://api.openai.com");
    }

    #[test]
    fn mime_type_mapping() {
        assert_eq!(OpenAiStt::get_mime_type("OGG"), "audio/ogg");
        assert_eq!(OpenAiStt::get_mime_type("mp3"), "audio/mpeg");
        assert_eq!(OpenAiStt::get_mime_type("xyz"), "audio/ogg");
        assert_eq!(OpenAiStt::get_file_extension("unknown"), "ogg");
    }

    #[tokio::test]
    async fn empty_audio_is_rejected() {
        let stt = OpenAiStt::new("sk-test".to_string(), None);
        assert!(stt.transcribe(&[], "ogg").await.is_err());
    }

    #[tokio::test]
    async fn transcribes_against_compatible_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "hello there" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stt = OpenAiStt::with_base_url("sk-test".to_string(), &server.uri(), None);
        let text = stt.transcribe(b"OggS fake voice", "ogg").await.unwrap();
        assert_eq!(text, "hello there");
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let stt = OpenAiStt::with_base_url("sk-test".to_string(), &server.uri(), None);
        let err = stt.transcribe(b"OggS", "ogg").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
