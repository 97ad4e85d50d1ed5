//! Automation session lifecycle.
//!
//! [`SessionRegistry`] owns every live session. A session wraps one
//! [`MessagingClient`], its prompt, its users and two background tasks:
//!
//! - the event pump, which consumes the client's event stream and hands
//!   messages to the [`InboundRouter`] through one ordered queue per sender
//! - the expiry timer, which destroys the session once its lifetime elapses
//!
//! Destroying a session aborts both tasks, tears the client down and removes
//! the pending QR image.

use crate::conversation::ConversationStore;
use crate::error::RelayError;
use crate::message::{ChatTurn, InboundMessage};
use crate::qr::QrArtifact;
use crate::router::InboundRouter;
use crate::traits::{ClientEvent, ClientFactory, EventSender, MessagingClient};
use chrono::{DateTime, Utc};
use relay_common::config::SessionsConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

/// Capacity of each session's event channel.
const EVENT_BUFFER: usize = 64;

/// Upper bound on waiting for a client to accept teardown.
const CLIENT_DESTROY_TIMEOUT: Duration = Duration::from_secs(15);

/// Registry-wide session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Lifetime of a session from creation. `None` keeps sessions until
    /// explicitly destroyed.
    pub idle_timeout: Option<Duration>,
    pub default_prompt: String,
    pub qr_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_config(config: &SessionsConfig) -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(config.idle_timeout_secs)),
            default_prompt: config.default_prompt.clone(),
            qr_dir: config.qr_dir.clone(),
        }
    }

    pub fn without_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionsConfig::default())
    }
}

/// The parts of a session needed to route a message.
#[derive(Clone)]
pub struct SessionContext {
    id: Arc<str>,
    client: Arc<dyn MessagingClient>,
    prompt: Arc<RwLock<String>>,
    users: ConversationStore,
}

impl SessionContext {
    pub fn new(
        id: impl Into<String>,
        client: Arc<dyn MessagingClient>,
        prompt: impl Into<String>,
        users: ConversationStore,
    ) -> Self {
        Self {
            id: Arc::from(id.into()),
            client,
            prompt: Arc::new(RwLock::new(prompt.into())),
            users,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn client(&self) -> &Arc<dyn MessagingClient> {
        &self.client
    }

    /// The current system prompt.
    pub async fn prompt(&self) -> String {
        self.prompt.read().await.clone()
    }

    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        *self.prompt.write().await = prompt.into();
    }

    pub fn users(&self) -> &ConversationStore {
        &self.users
    }
}

/// Operator view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub client: String,
    pub created_at: DateTime<Utc>,
    pub users: usize,
}

/// A live session and the resources it owns.
struct Session {
    context: SessionContext,
    created_at: DateTime<Utc>,
    qr: QrArtifact,
    events: EventSender,
    pump: JoinHandle<()>,
    expiry: Option<JoinHandle<()>>,
}

impl Session {
    /// Release everything the session owns. Failures are logged.
    async fn teardown(self) {
        if let Some(expiry) = &self.expiry {
            expiry.abort();
        }
        self.pump.abort();

        let id = self.context.id();
        match tokio::time::timeout(CLIENT_DESTROY_TIMEOUT, self.context.client().destroy()).await {
            Ok(Ok(())) => tracing::debug!(session_id = %id, "Client torn down"),
            Ok(Err(e)) => {
                let err = RelayError::Cleanup(e.to_string());
                tracing::warn!(session_id = %id, error = %err, "Client teardown failed");
            }
            Err(_) => tracing::warn!(
                session_id = %id,
                timeout_secs = CLIENT_DESTROY_TIMEOUT.as_secs(),
                "Client teardown timed out"
            ),
        }

        self.qr.remove().await;
    }
}

struct RegistryInner {
    sessions: RwLock<HashMap<String, Session>>,
    factory: Arc<dyn ClientFactory>,
    router: Arc<InboundRouter>,
    settings: SessionSettings,
}

/// Map from session id to live session. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        router: Arc<InboundRouter>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                factory,
                router,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    /// Create a session, start its client login and arm its expiry timer.
    ///
    /// Returns the new session id.
    pub async fn create(&self) -> Result<String, RelayError> {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let settings = &self.inner.settings;

        let (id, client) = {
            let mut sessions = self.inner.sessions.write().await;
            let id = loop {
                let candidate = Uuid::new_v4().to_string();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };

            let client = self.inner.factory.create(&id, events.clone())?;
            let context = SessionContext::new(
                id.clone(),
                client.clone(),
                settings.default_prompt.clone(),
                ConversationStore::new(),
            );
            let qr = QrArtifact::for_session(&settings.qr_dir, &id);

            let pump = tokio::spawn(pump_events(
                context.clone(),
                qr.clone(),
                receiver,
                self.inner.router.clone(),
                Arc::downgrade(&self.inner),
            ));
            let expiry = settings
                .idle_timeout
                .map(|timeout| tokio::spawn(expire_after(timeout, id.clone(), Arc::downgrade(&self.inner))));

            sessions.insert(
                id.clone(),
                Session {
                    context,
                    created_at: Utc::now(),
                    qr,
                    events,
                    pump,
                    expiry,
                },
            );
            (id, client)
        };

        if let Err(e) = client.initialize().await {
            tracing::error!(session_id = %id, error = %e, "Client failed to start");
            self.destroy(&id).await;
            return Err(e.into());
        }

        tracing::info!(
            session_id = %id,
            client = client.name(),
            timeout_secs = settings.idle_timeout.map(|t| t.as_secs()),
            "Session created"
        );
        Ok(id)
    }

    /// Look up a live session.
    pub async fn get(&self, id: &str) -> Result<SessionContext, RelayError> {
        self.inner
            .sessions
            .read()
            .await
            .get(id)
            .map(|session| session.context.clone())
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(id)
    }

    /// Destroy a session. Returns false if it was already gone.
    pub async fn destroy(&self, id: &str) -> bool {
        let Some(session) = self.inner.sessions.write().await.remove(id) else {
            tracing::debug!(session_id = %id, "Session already gone");
            return false;
        };

        session.teardown().await;
        tracing::info!(session_id = %id, "Session destroyed");
        true
    }

    /// Destroy every live session concurrently.
    pub async fn destroy_all(&self) -> usize {
        let sessions: Vec<Session> = self
            .inner
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = sessions.len();

        let mut teardowns = JoinSet::new();
        for session in sessions {
            teardowns.spawn(session.teardown());
        }
        while let Some(result) = teardowns.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Session teardown task failed");
            }
        }

        if count > 0 {
            tracing::info!(count, "All sessions destroyed");
        }
        count
    }

    /// Replace a session's system prompt.
    pub async fn set_prompt(&self, id: &str, prompt: impl Into<String>) -> Result<(), RelayError> {
        let context = self.get(id).await?;
        context.set_prompt(prompt).await;
        tracing::info!(session_id = %id, "Session prompt updated");
        Ok(())
    }

    /// Empty one user's history within a session. Waits for that user's
    /// in-flight reply, if any.
    pub async fn clear_history(&self, id: &str, user_id: &str) -> Result<(), RelayError> {
        let not_found = || RelayError::UserNotFound {
            session_id: id.to_string(),
            user_id: user_id.to_string(),
        };

        let context = self.get(id).await.map_err(|_| not_found())?;
        if !context.users().clear(user_id).await {
            return Err(not_found());
        }

        tracing::info!(session_id = %id, user_id = %user_id, "History cleared");
        Ok(())
    }

    /// Stored history of one user.
    pub async fn history(&self, id: &str, user_id: &str) -> Result<Vec<ChatTurn>, RelayError> {
        let context = self.get(id).await?;
        context
            .users()
            .history(user_id)
            .await
            .ok_or_else(|| RelayError::UserNotFound {
                session_id: id.to_string(),
                user_id: user_id.to_string(),
            })
    }

    /// The pending login QR image of a session.
    pub async fn qr_image(&self, id: &str) -> Result<Vec<u8>, RelayError> {
        let qr = self
            .inner
            .sessions
            .read()
            .await
            .get(id)
            .map(|session| session.qr.clone())
            .ok_or_else(|| RelayError::QrNotFound(id.to_string()))?;

        qr.read()
            .await
            .ok_or_else(|| RelayError::QrNotFound(id.to_string()))
    }

    /// Sender for feeding externally delivered client events into a session.
    pub async fn event_sender(&self, id: &str) -> Result<EventSender, RelayError> {
        self.inner
            .sessions
            .read()
            .await
            .get(id)
            .map(|session| session.events.clone())
            .ok_or_else(|| RelayError::SessionNotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let contexts: Vec<(SessionContext, DateTime<Utc>)> = self
            .inner
            .sessions
            .read()
            .await
            .values()
            .map(|session| (session.context.clone(), session.created_at))
            .collect();

        let mut summaries = Vec::with_capacity(contexts.len());
        for (context, created_at) in contexts {
            summaries.push(SessionSummary {
                id: context.id().to_string(),
                client: context.client().name().to_string(),
                created_at,
                users: context.users().len().await,
            });
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.sessions.read().await.is_empty()
    }
}

/// Destroy a session from one of its own tasks without aborting the caller
/// mid-teardown.
fn spawn_destroy(registry: &Weak<RegistryInner>, id: String) {
    if let Some(inner) = registry.upgrade() {
        let registry = SessionRegistry { inner };
        tokio::spawn(async move {
            registry.destroy(&id).await;
        });
    }
}

async fn expire_after(timeout: Duration, id: String, registry: Weak<RegistryInner>) {
    tokio::time::sleep(timeout).await;
    tracing::info!(session_id = %id, timeout_secs = timeout.as_secs(), "Session expired");
    spawn_destroy(&registry, id);
}

async fn pump_events(
    context: SessionContext,
    qr: QrArtifact,
    mut events: mpsc::Receiver<ClientEvent>,
    router: Arc<InboundRouter>,
    registry: Weak<RegistryInner>,
) {
    let mut queues = UserQueues::default();

    while let Some(event) = events.recv().await {
        tracing::debug!(session_id = %context.id(), event = event.kind(), "Client event");

        match event {
            ClientEvent::Qr { code, image } => {
                tracing::info!(session_id = %context.id(), qr = %code, "Scan the login QR code");
                if let Some(png) = image {
                    if let Err(e) = qr.store(&png).await {
                        tracing::warn!(session_id = %context.id(), error = %e, "Failed to store QR image");
                    }
                }
            }
            ClientEvent::Ready => {
                tracing::info!(session_id = %context.id(), "Client ready");
                qr.remove().await;
            }
            ClientEvent::Disconnected { reason } => {
                tracing::info!(
                    session_id = %context.id(),
                    reason = reason.as_deref().unwrap_or("unknown"),
                    "Client disconnected"
                );
                qr.remove().await;
                spawn_destroy(&registry, context.id().to_string());
                break;
            }
            ClientEvent::Message(message) if !router.accepts(&message) => {
                router.handle(&context, message).await;
            }
            ClientEvent::Message(message) => {
                queues.dispatch(&context, &router, message);
            }
        }
    }
}

/// One FIFO queue and worker task per sender.
///
/// A sender's messages are handled strictly in arrival order while other
/// senders of the same session proceed concurrently. Dropping the queues
/// aborts every worker.
#[derive(Default)]
struct UserQueues {
    senders: HashMap<String, mpsc::UnboundedSender<InboundMessage>>,
    workers: JoinSet<()>,
}

impl UserQueues {
    fn dispatch(
        &mut self,
        context: &SessionContext,
        router: &Arc<InboundRouter>,
        message: InboundMessage,
    ) {
        let message = match self.senders.get(&message.from) {
            Some(queue) => match queue.send(message) {
                Ok(()) => return,
                // worker gone, start a fresh one
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(message.from.clone(), tx);
        self.workers.spawn(drain_user_queue(
            context.clone(),
            router.clone(),
            message,
            rx,
        ));
    }
}

async fn drain_user_queue(
    context: SessionContext,
    router: Arc<InboundRouter>,
    first: InboundMessage,
    mut queue: mpsc::UnboundedReceiver<InboundMessage>,
) {
    router.handle(&context, first).await;
    while let Some(message) = queue.recv().await {
        router.handle(&context, message).await;
    }
}
