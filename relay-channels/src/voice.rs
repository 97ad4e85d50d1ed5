//! Voice note handling: transcription of inbound audio and synthesized replies.
//!
//! Audio passes through a temporary file on each leg. The file is removed
//! when the call finishes, on success and on failure alike.

use crate::error::RelayError;
use crate::message::Media;
use crate::stt::SpeechToText;
use crate::tts::{AudioFormat, SynthesisOptions, TextToSpeech};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

/// File name of synthesized replies as seen by the recipient.
pub const REPLY_FILENAME: &str = "reply.mp3";

/// A temporary audio file, deleted on [`AudioArtifact::discard`] or drop.
#[derive(Debug)]
pub struct AudioArtifact {
    path: TempPath,
}

impl AudioArtifact {
    /// Write `data` to a fresh file in `dir`.
    pub async fn write(
        dir: &Path,
        prefix: &str,
        extension: &str,
        data: &[u8],
    ) -> Result<Self, RelayError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RelayError::Internal(format!("scratch dir {}: {e}", dir.display())))?;

        let path = tempfile::Builder::new()
            .prefix(&format!("{prefix}-"))
            .suffix(&format!(".{extension}"))
            .tempfile_in(dir)
            .map_err(|e| RelayError::Internal(format!("temp file: {e}")))?
            .into_temp_path();

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| RelayError::Internal(format!("write {}: {e}", path.display())))?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Vec<u8>, RelayError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| RelayError::Internal(format!("read {}: {e}", self.path.display())))
    }

    /// Delete the file now, logging a failed delete instead of returning it.
    pub fn discard(self) {
        let display = self.path.display().to_string();
        if let Err(e) = self.path.close() {
            let err = RelayError::Cleanup(format!("{display}: {e}"));
            tracing::warn!(error = %err, "Failed to delete audio artifact");
        }
    }
}

/// Speech collaborators plus the scratch directory they share.
pub struct VoicePipeline {
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn TextToSpeech>,
    scratch_dir: PathBuf,
}

impl VoicePipeline {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stt,
            tts,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Transcribe a downloaded voice note.
    pub async fn transcribe(&self, media: &Media) -> Result<String, RelayError> {
        let artifact = AudioArtifact::write(&self.scratch_dir, "voice", "ogg", &media.data).await?;

        let result = match artifact.read().await {
            Ok(bytes) => self
                .stt
                .transcribe(&bytes, "ogg")
                .await
                .map_err(|e| RelayError::Transcription(e.to_string())),
            Err(e) => Err(e),
        };

        artifact.discard();
        result
    }

    /// Synthesize a reply into sendable audio media.
    pub async fn synthesize(&self, text: &str) -> Result<Media, RelayError> {
        let options = SynthesisOptions {
            format: AudioFormat::Mp3,
            ..SynthesisOptions::default()
        };
        let audio = self
            .tts
            .synthesize(text, Some(options))
            .await
            .map_err(|e| RelayError::Synthesis(e.to_string()))?;

        let artifact = AudioArtifact::write(&self.scratch_dir, "reply", "mp3", &audio).await?;
        let result = artifact.read().await;
        artifact.discard();

        Ok(Media::new(AudioFormat::Mp3.mime_type(), result?).with_filename(REPLY_FILENAME))
    }
}
