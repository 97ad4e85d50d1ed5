//! Text-to-speech trait definition.

use async_trait::async_trait;

/// Output audio format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    /// MP3 audio (most compatible)
    #[default]
    Mp3,
    /// Opus audio (smaller, what voice notes use)
    Opus,
    /// WAV audio (uncompressed)
    Wav,
}

impl AudioFormat {
    /// Get the file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Wav => "wav",
        }
    }

    /// Get the MIME type for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/ogg; codecs=opus",
            Self::Wav => "audio/wav",
        }
    }
}

/// Text-to-speech synthesis options.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOptions {
    /// Voice ID to use (provider-specific)
    pub voice: Option<String>,
    /// Output audio format
    pub format: AudioFormat,
    /// Speaking speed (0.25 - 4.0, default 1.0)
    pub speed: Option<f32>,
}

/// Text-to-speech trait for converting text to audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize text to audio bytes in the requested format.
    async fn synthesize(
        &self,
        text: &str,
        options: Option<SynthesisOptions>,
    ) -> anyhow::Result<Vec<u8>>;

    /// Get the default voice ID for this provider.
    fn default_voice(&self) -> &str;

    /// Get the provider name.
    fn provider_name(&self) -> &str;
}
