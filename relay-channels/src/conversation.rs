//! Per-user conversation history scoped to one session.

use crate::message::ChatTurn;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Conversation state of one user within a session.
///
/// History is stored in full; the window is applied when a call context is
/// built.
#[derive(Debug, Default, Clone)]
pub struct UserState {
    history: Vec<ChatTurn>,
}

impl UserState {
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.history.push(turn);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// The system prompt followed by the last `window` turns.
    pub fn context(&self, prompt: &str, window: usize) -> Vec<ChatTurn> {
        let start = self.history.len().saturating_sub(window);
        let mut context = Vec::with_capacity(self.history.len() - start + 1);
        context.push(ChatTurn::system(prompt));
        context.extend_from_slice(&self.history[start..]);
        context
    }
}

/// Handle to a user's state. Holding the lock serializes that user's turns.
pub type UserHandle = Arc<Mutex<UserState>>;

/// Users of one session, keyed by sender address.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    users: Arc<RwLock<HashMap<String, UserHandle>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a user's state, creating it on first contact.
    pub async fn user(&self, user_id: &str) -> UserHandle {
        if let Some(user) = self.users.read().await.get(user_id) {
            return user.clone();
        }

        self.users
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Get a user's state without creating it.
    pub async fn get(&self, user_id: &str) -> Option<UserHandle> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Empty a user's history, keeping the entry. Returns false for unknown users.
    ///
    /// Waits for the user's in-flight turn, so it can take as long as one
    /// bounded completion call.
    pub async fn clear(&self, user_id: &str) -> bool {
        let Some(user) = self.get(user_id).await else {
            return false;
        };
        user.lock().await.clear();
        true
    }

    /// Snapshot of a user's stored history.
    pub async fn history(&self, user_id: &str) -> Option<Vec<ChatTurn>> {
        let user = self.get(user_id).await?;
        let history = user.lock().await.history().to_vec();
        Some(history)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}
