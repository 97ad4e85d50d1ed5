//! Relay Common - Shared configuration, errors and logging for the chat relay.
//!
//! This crate provides:
//! - Configuration types and loading (file, `.env`, environment overrides)
//! - The startup error type
//! - Logging setup and trace ID helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    BotConfig, Config, LlmConfig, NetworkConfig, ObservabilityConfig, SecretsConfig,
    SessionsConfig, SidecarConfig, VoiceConfig, VoiceSttConfig, VoiceTtsConfig,
};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
}
