//! Relay Channels - Chat relay between a browser-automated messaging client
//! and a hosted language model.
//!
//! Two entry points share this library:
//! - `relay-server`: HTTP-managed, one automation session per login
//! - `relay-bot`: a single long-lived session with voice note support
//!
//! ## Architecture
//!
//! ```text
//! sidecar → webhook → session event pump → InboundRouter → ChatCompletion
//!                                               ↓
//! user   ←──────────── MessagingClient.send ←── reply
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod completion;
pub mod conversation;
pub mod error;
pub mod message;
pub mod qr;
pub mod router;
pub mod routes;
pub mod session;
pub mod sidecar;
pub mod stt;
pub mod traits;
pub mod tts;
pub mod voice;

// Re-export commonly used types
pub use completion::{ChatCompletion, CompletionError, OpenAiCompletion};
pub use conversation::{ConversationStore, UserHandle, UserState};
pub use error::RelayError;
pub use message::{ChatTurn, InboundMessage, Media, OutgoingContent, Role};
pub use router::InboundRouter;
pub use routes::{build_bot_router, build_router, AppState};
pub use session::{SessionContext, SessionRegistry, SessionSettings, SessionSummary};
pub use sidecar::{SidecarClient, SidecarEvent, SidecarFactory};
pub use stt::{create_stt, OpenAiStt, SpeechToText};
pub use traits::{ChannelError, ChannelResult, ClientEvent, ClientFactory, EventSender, MessagingClient};
pub use tts::{create_tts, AudioFormat, OpenAiTts, SynthesisOptions, TextToSpeech};
pub use voice::VoicePipeline;

use anyhow::Context;
use relay_common::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the multi-session registry from configuration.
pub fn build_server_registry(config: &Config) -> anyhow::Result<SessionRegistry> {
    let api_key = config.require_openai_key()?;

    let completion = OpenAiCompletion::from_config(api_key, &config.llm);
    let router = InboundRouter::new(Arc::new(completion))
        .with_apology(config.sessions.apology.clone())
        .with_history_window(config.sessions.history_window)
        .with_call_timeout(Duration::from_secs(config.llm.timeout_secs));

    let factory = SidecarFactory::new(&config.sidecar.base_url, &config.webhook_base_url());

    Ok(SessionRegistry::new(
        Arc::new(factory),
        Arc::new(router),
        SessionSettings::from_config(&config.sessions),
    ))
}

/// Build the single-session bot registry from configuration.
pub fn build_bot_registry(config: &Config) -> anyhow::Result<SessionRegistry> {
    let api_key = config.require_openai_key()?;
    let bot = &config.bot;

    let completion = OpenAiCompletion::with_base_url(api_key, &config.llm.base_url, bot.model.clone())
        .with_max_tokens(Some(bot.max_tokens))
        .with_temperature(config.llm.temperature);

    let mut router = InboundRouter::new(Arc::new(completion))
        .with_apology(bot.apology.clone())
        .with_history_window(config.sessions.history_window)
        .with_call_timeout(Duration::from_secs(config.llm.timeout_secs));

    if bot.voice_enabled {
        let voice = &config.voice;
        let stt = create_stt(
            &voice.stt.provider,
            api_key,
            Some(voice.stt.model.as_str()),
            voice.stt.base_url.as_deref(),
        )
        .context("failed to configure speech-to-text")?;
        let tts = create_tts(
            &voice.tts.provider,
            api_key,
            Some(voice.tts.model.as_str()),
            Some(voice.tts.voice.as_str()),
            voice.tts.base_url.as_deref(),
        )
        .context("failed to configure text-to-speech")?;
        let scratch_dir = voice
            .scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("relay-voice"));

        tracing::info!(
            stt = stt.provider_name(),
            tts = tts.provider_name(),
            "Voice notes enabled"
        );
        router = router.with_voice(VoicePipeline::new(stt, tts, scratch_dir));
    }

    let mut settings = SessionSettings::from_config(&config.sessions).without_timeout();
    settings.default_prompt = bot.prompt.clone();

    let factory = SidecarFactory::new(&config.sidecar.base_url, &config.webhook_base_url());
    Ok(SessionRegistry::new(Arc::new(factory), Arc::new(router), settings))
}

async fn bind(config: &Config) -> anyhow::Result<TcpListener> {
    let addr = config.listen_address();
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
}

/// Start the multi-session HTTP server. Returns after shutdown, once every
/// session has been destroyed.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let registry = build_server_registry(config)?;
    let app = build_router(AppState::new(registry.clone())).layer(cors());

    let listener = bind(config).await?;
    tracing::info!("Starting relay server on {}", config.listen_address());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    registry.destroy_all().await;
    served.context("server error")
}

/// Start the single-session bot. The session is created once the webhook
/// listener is up, and never expires.
pub async fn start_bot(config: &Config) -> anyhow::Result<()> {
    let registry = build_bot_registry(config)?;
    let app = build_bot_router(AppState::new(registry.clone())).layer(cors());

    let listener = bind(config).await?;
    tracing::info!("Starting relay bot on {}", config.listen_address());

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    match registry.create().await {
        Ok(id) => tracing::info!(session_id = %id, "Bot session started, waiting for login QR"),
        Err(e) => {
            server.abort();
            return Err(e).context("failed to start the bot session");
        }
    }

    let served = server.await.context("server task failed")?;
    registry.destroy_all().await;
    served.context("server error")
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Signal handlers unavailable, falling back to Ctrl+C");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
