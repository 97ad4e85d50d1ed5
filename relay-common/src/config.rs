//! Configuration management for the relay services.
//!
//! Both binaries share one configuration file at `~/.relay/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (`RELAY_*` prefix, `OPENAI_API_KEY`), including
//!    values loaded from a `.env` file
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `RELAY_BIND_ADDRESS` → network.bind
//! - `RELAY_PORT` → network.port
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format
//! - `RELAY_SESSION_TIMEOUT_SECS` → sessions.idle_timeout_secs
//! - `RELAY_QR_DIR` → sessions.qr_dir
//! - `RELAY_SIDECAR_URL` → sidecar.base_url
//! - `RELAY_PUBLIC_URL` → sidecar.public_url
//! - `RELAY_LLM_MODEL` → llm.model
//! - `RELAY_LLM_BASE_URL` → llm.base_url
//! - `OPENAI_API_KEY` → secrets.openai_api_key

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network
// ============================================================================

/// Listener configuration for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default is `127.0.0.1` (local only).
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

// ============================================================================
// Sessions
// ============================================================================

/// Multi-session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Absolute lifetime of a session from creation, in seconds.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Prompt assigned to new sessions.
    #[serde(default = "default_session_prompt")]
    pub default_prompt: String,

    /// Number of trailing history turns sent with each completion call.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Directory holding transient QR images.
    #[serde(default = "default_qr_dir")]
    pub qr_dir: PathBuf,

    /// Reply sent when a completion fails.
    #[serde(default = "default_session_apology")]
    pub apology: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            default_prompt: default_session_prompt(),
            history_window: default_history_window(),
            qr_dir: default_qr_dir(),
            apology: default_session_apology(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_session_prompt() -> String {
    "You are a helpful assistant.".into()
}

fn default_history_window() -> usize {
    10
}

fn default_qr_dir() -> PathBuf {
    std::env::temp_dir().join("relay-qr")
}

fn default_session_apology() -> String {
    "⚠️ Sorry, something went wrong.".into()
}

// ============================================================================
// LLM
// ============================================================================

/// Completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound for each completion, transcription or synthesis call.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: None,
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_timeout_secs() -> u64 {
    60
}

// ============================================================================
// Voice
// ============================================================================

/// Voice configuration (TTS/STT).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoiceConfig {
    #[serde(default)]
    pub tts: VoiceTtsConfig,

    #[serde(default)]
    pub stt: VoiceSttConfig,

    /// Directory for temporary audio artifacts. Defaults to the system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

/// TTS provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceTtsConfig {
    #[serde(default = "default_tts_provider")]
    pub provider: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for VoiceTtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            model: default_tts_model(),
            voice: default_tts_voice(),
            base_url: None,
        }
    }
}

fn default_tts_provider() -> String {
    "openai".into()
}

fn default_tts_model() -> String {
    "tts-1".into()
}

fn default_tts_voice() -> String {
    "onyx".into()
}

/// STT provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSttConfig {
    #[serde(default = "default_stt_provider")]
    pub provider: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for VoiceSttConfig {
    fn default() -> Self {
        Self {
            provider: default_stt_provider(),
            model: default_stt_model(),
            base_url: None,
        }
    }
}

fn default_stt_provider() -> String {
    "openai".into()
}

fn default_stt_model() -> String {
    "whisper-1".into()
}

// ============================================================================
// Automation sidecar
// ============================================================================

/// Browser automation sidecar that owns the messaging logins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Base URL of the sidecar API.
    #[serde(default = "default_sidecar_url")]
    pub base_url: String,

    /// Public URL of this service, used to build the event webhook URL
    /// handed to the sidecar. Defaults to the local listener.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            base_url: default_sidecar_url(),
            public_url: None,
        }
    }
}

fn default_sidecar_url() -> String {
    "http://127.0.0.1:3100".into()
}

// ============================================================================
// Single-session bot
// ============================================================================

/// Settings for the single-session personal bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_bot_prompt")]
    pub prompt: String,

    #[serde(default = "default_bot_apology")]
    pub apology: String,

    #[serde(default = "default_bot_model")]
    pub model: String,

    #[serde(default = "default_bot_max_tokens")]
    pub max_tokens: u32,

    /// Transcribe voice notes and answer them with synthesized audio.
    #[serde(default = "default_true")]
    pub voice_enabled: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prompt: default_bot_prompt(),
            apology: default_bot_apology(),
            model: default_bot_model(),
            max_tokens: default_bot_max_tokens(),
            voice_enabled: true,
        }
    }
}

fn default_bot_prompt() -> String {
    "You are mimicking the user's personal WhatsApp style.\n\
     Reply casually, in lowercase, short and direct. Use informal grammar (\"r\", \"u\", \"got\", \"don't\", \"coz\").\n\
     No emojis or formal language. Never say you're an AI."
        .into()
}

fn default_bot_apology() -> String {
    "sorry, something went wrong".into()
}

fn default_bot_model() -> String {
    "gpt-3.5-turbo-0125".into()
}

fn default_bot_max_tokens() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Secrets / observability
// ============================================================================

/// API keys.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure for the relay services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub sidecar: SidecarConfig,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults when absent.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;

        serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config from {}: {e}", path.display()))
        })
    }

    /// Load `.env`, the config file, then apply environment overrides.
    pub fn load_with_env() -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("RELAY_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("RELAY_PORT").and_then(|p| p.parse().ok()) {
            self.network.port = port;
        }
        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(secs) = lookup("RELAY_SESSION_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.sessions.idle_timeout_secs = secs;
        }
        if let Some(dir) = lookup("RELAY_QR_DIR") {
            self.sessions.qr_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("RELAY_SIDECAR_URL") {
            self.sidecar.base_url = url;
        }
        if let Some(url) = lookup("RELAY_PUBLIC_URL") {
            self.sidecar.public_url = Some(url);
        }
        if let Some(model) = lookup("RELAY_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("RELAY_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.secrets.openai_api_key = Some(key);
        }
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sessions.history_window == 0 {
            return Err(Error::Config("sessions.history_window must be at least 1".into()));
        }
        if self.sessions.idle_timeout_secs == 0 {
            return Err(Error::Config("sessions.idle_timeout_secs must be at least 1".into()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// The OpenAI API key, required by both binaries.
    pub fn require_openai_key(&self) -> Result<&str> {
        self.secrets
            .openai_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(Error::MissingCredential("OPENAI_API_KEY"))
    }

    /// Socket address string of the HTTP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    /// URL the sidecar should post session events to.
    pub fn webhook_base_url(&self) -> String {
        self.sidecar
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen_address()))
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.network.port, 3000);
        assert_eq!(config.sessions.idle_timeout_secs, 1800);
        assert_eq!(config.sessions.history_window, 10);
        assert_eq!(config.sessions.default_prompt, "You are a helpful assistant.");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.bot.model, "gpt-3.5-turbo-0125");
        assert_eq!(config.bot.max_tokens, 100);
        assert!(config.bot.voice_enabled);
    }

    #[test]
    fn parses_partial_file() {
        let config: Config = serde_json::from_str(
            r#"{ "network": { "port": 8080 }, "sessions": { "history_window": 4 } }"#,
        )
        .unwrap();
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.network.bind, "127.0.0.1");
        assert_eq!(config.sessions.history_window, 4);
        assert_eq!(config.sessions.idle_timeout_secs, 1800);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("RELAY_PORT", "4000"),
            ("RELAY_SESSION_TIMEOUT_SECS", "60"),
            ("OPENAI_API_KEY", "sk-test"),
            ("RELAY_PUBLIC_URL", "https://relay.example.com/"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_with(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.network.port, 4000);
        assert_eq!(config.sessions.idle_timeout_secs, 60);
        assert_eq!(config.require_openai_key().unwrap(), "sk-test");
        assert_eq!(config.webhook_base_url(), "https://relay.example.com");
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_with(|k| (k == "RELAY_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.network.port, 3000);
    }

    #[test]
    fn missing_key_is_reported() {
        let config = Config::default();
        let err = config.require_openai_key().unwrap_err();
        assert!(matches!(err, Error::MissingCredential("OPENAI_API_KEY")));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = Config::default();
        config.sessions.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn webhook_base_defaults_to_listener() {
        let config = Config::default();
        assert_eq!(config.webhook_base_url(), "http://127.0.0.1:3000");
    }
}
