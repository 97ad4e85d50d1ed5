//! Transient login QR images.
//!
//! The sidecar renders the QR; the relay only keeps the latest PNG for a
//! session on disk until the login completes or the session ends.

use base64::Engine;
use std::io;
use std::path::{Path, PathBuf};

/// Location of one session's pending QR image.
#[derive(Debug, Clone)]
pub struct QrArtifact {
    path: PathBuf,
}

impl QrArtifact {
    pub fn for_session(dir: &Path, session_id: &str) -> Self {
        Self {
            path: dir.join(format!("qr-{session_id}.png")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the pending image.
    pub async fn store(&self, png: &[u8]) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.path, png).await
    }

    /// The pending image, if one exists.
    pub async fn read(&self) -> Option<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read QR image");
                None
            }
        }
    }

    /// Delete the pending image. Failures are logged, never returned.
    pub async fn remove(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!(path = %self.path.display(), "QR image removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove QR image")
            }
        }
    }
}

/// Encode a PNG as a `data:` URL.
pub fn png_data_url(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}
