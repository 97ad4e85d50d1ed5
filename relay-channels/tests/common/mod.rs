//! Shared mocks for relay integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use relay_channels::{
    ChannelError, ChannelResult, ChatCompletion, ChatTurn, ClientEvent, ClientFactory,
    CompletionError, EventSender, InboundMessage, InboundRouter, Media, MessagingClient,
    OutgoingContent, SessionRegistry, SessionSettings,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APOLOGY: &str = "sorry, something went wrong";

/// Messaging client that records sends and lets tests inject events.
pub struct MockClient {
    pub session_id: String,
    events: EventSender,
    pub sent: Mutex<Vec<(String, OutgoingContent)>>,
    pub initialized: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl MockClient {
    /// Push an event as the automation client would.
    pub async fn emit(&self, event: ClientEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub async fn receive(&self, message: InboundMessage) -> bool {
        self.emit(ClientEvent::Message(message)).await
    }

    pub fn sent(&self) -> Vec<(String, OutgoingContent)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn initialize(&self) -> ChannelResult<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, to: &str, content: OutgoingContent) -> ChannelResult<()> {
        self.sent.lock().unwrap().push((to.to_string(), content));
        Ok(())
    }

    async fn download_media(&self, _message: &InboundMessage) -> ChannelResult<Option<Media>> {
        Ok(None)
    }

    async fn destroy(&self) -> ChannelResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that keeps every client it creates.
#[derive(Default)]
pub struct MockFactory {
    clients: Mutex<Vec<Arc<MockClient>>>,
    fail_create: bool,
}

impl MockFactory {
    /// A factory whose clients cannot be constructed.
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn client(&self, session_id: &str) -> Arc<MockClient> {
        self.clients
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.session_id == session_id)
            .cloned()
            .unwrap_or_else(|| panic!("no client for session {session_id}"))
    }

    pub fn count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

impl ClientFactory for MockFactory {
    fn create(
        &self,
        session_id: &str,
        events: EventSender,
    ) -> ChannelResult<Arc<dyn MessagingClient>> {
        if self.fail_create {
            return Err(ChannelError::Connection("sidecar unreachable".into()));
        }
        let client = Arc::new(MockClient {
            session_id: session_id.to_string(),
            events,
            sent: Mutex::new(Vec::new()),
            initialized: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        });
        self.clients.lock().unwrap().push(client.clone());
        Ok(client)
    }
}

/// Completion with scripted results that records every context it receives.
///
/// Once the script runs out it replies "OK", or echoes the last turn when
/// built with [`MockCompletion::echo`].
#[derive(Default)]
pub struct MockCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    contexts: Mutex<Vec<Vec<ChatTurn>>>,
    delay: Option<Duration>,
    echo: bool,
}

impl MockCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(script: Vec<Result<String, CompletionError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    /// Replies `re: <last turn>` after `delay`.
    pub fn echo(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            echo: true,
            ..Default::default()
        })
    }

    pub fn contexts(&self) -> Vec<Vec<ChatTurn>> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatCompletion for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, CompletionError> {
        self.contexts.lock().unwrap().push(turns.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.echo {
            let last = turns.last().map(|t| t.content.as_str()).unwrap_or_default();
            return Ok(format!("re: {last}"));
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("OK".to_string()))
    }
}

pub fn settings(qr_dir: &Path) -> SessionSettings {
    SessionSettings {
        idle_timeout: Some(Duration::from_secs(30 * 60)),
        default_prompt: "You are a helpful assistant.".to_string(),
        qr_dir: qr_dir.to_path_buf(),
    }
}

pub fn registry(
    factory: Arc<MockFactory>,
    completion: Arc<MockCompletion>,
    settings: SessionSettings,
) -> SessionRegistry {
    let router = InboundRouter::new(completion).with_apology(APOLOGY);
    SessionRegistry::new(factory, Arc::new(router), settings)
}

pub fn text_message(from: &str, body: &str) -> InboundMessage {
    InboundMessage {
        id: format!("msg-{body}"),
        from: from.to_string(),
        body: body.to_string(),
        from_me: false,
        is_group: false,
        has_media: false,
        mimetype: None,
    }
}

/// Poll until `condition` holds, failing the test after five seconds.
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met in time");
}

/// Async variant of [`eventually`].
pub async fn eventually_async<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met in time");
}
