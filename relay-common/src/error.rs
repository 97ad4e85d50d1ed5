//! Error types shared by the relay crates.

use thiserror::Error;

/// Result type alias using the common error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration and preparing a service.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A credential required at startup is absent
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error means startup must abort.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingCredential(_) | Self::Config(_))
    }
}
