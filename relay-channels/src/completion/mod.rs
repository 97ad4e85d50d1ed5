//! Chat completion collaborator.
//!
//! The router only sees [`ChatCompletion`]; the OpenAI implementation talks
//! to any endpoint that speaks the `/v1/chat/completions` protocol.

mod openai;

pub use openai::OpenAiCompletion;

use crate::message::ChatTurn;
use async_trait::async_trait;

/// Error from a completion call.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("Completion returned no content")]
    Empty,
}

impl CompletionError {
    /// Map a non-success HTTP status and body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 {
            Self::RateLimited(body)
        } else {
            Self::Api {
                status,
                message: body,
            }
        }
    }
}

/// Produces the next reply for an ordered list of turns.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Complete the conversation, returning the reply text.
    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, CompletionError>;
}
