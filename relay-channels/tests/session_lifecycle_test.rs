//! Session registry lifecycle and end-to-end routing tests.

mod common;

use common::*;
use relay_channels::{
    ChatTurn, ClientEvent, CompletionError, OutgoingContent, RelayError, Role, SessionRegistry,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn setup(completion: Arc<MockCompletion>) -> (SessionRegistry, Arc<MockFactory>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(MockFactory::default());
    let registry = registry(factory.clone(), completion, settings(dir.path()));
    (registry, factory, dir)
}

async fn wait_for_qr(registry: &SessionRegistry, id: &str, present: bool) {
    let registry = registry.clone();
    let id = id.to_string();
    eventually_async(move || {
        let registry = registry.clone();
        let id = id.clone();
        async move { registry.qr_image(&id).await.is_ok() == present }
    })
    .await;
}

async fn wait_until_gone(registry: &SessionRegistry, id: &str) {
    let registry = registry.clone();
    let id = id.to_string();
    eventually_async(move || {
        let registry = registry.clone();
        let id = id.clone();
        async move { !registry.contains(&id).await }
    })
    .await;
}

/// Let spawned tasks run under a paused clock.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_prompt_then_reply() {
    let completion = MockCompletion::scripted(vec![Ok("OK".into())]);
    let (registry, factory, _dir) = setup(completion.clone());

    let id = registry.create().await.unwrap();
    registry.set_prompt(&id, "Reply only with OK").await.unwrap();

    let client = factory.client(&id);
    assert!(client.receive(text_message("u1", "hi")).await);
    eventually(|| client.sent().len() == 1).await;

    assert_eq!(
        completion.contexts(),
        vec![vec![
            ChatTurn::system("Reply only with OK"),
            ChatTurn::user("hi")
        ]]
    );
    assert_eq!(
        client.sent(),
        vec![("u1".to_string(), OutgoingContent::Text("OK".into()))]
    );
    assert_eq!(
        registry.history(&id, "u1").await.unwrap(),
        vec![ChatTurn::user("hi"), ChatTurn::assistant("OK")]
    );
}

#[tokio::test]
async fn test_completion_failure_sends_apology() {
    let completion = MockCompletion::scripted(vec![Err(CompletionError::Api {
        status: 500,
        message: "upstream down".into(),
    })]);
    let (registry, factory, _dir) = setup(completion);

    let id = registry.create().await.unwrap();
    let client = factory.client(&id);
    client.receive(text_message("u1", "hi")).await;
    eventually(|| client.sent().len() == 1).await;

    assert_eq!(client.sent()[0].1, OutgoingContent::Text(APOLOGY.into()));
    let history = registry.history(&id, "u1").await.unwrap();
    assert_eq!(history, vec![ChatTurn::user("hi")]);
    assert!(history.iter().all(|t| t.role != Role::Assistant));
}

#[tokio::test]
async fn test_set_prompt_on_unknown_session() {
    let completion = MockCompletion::new();
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();

    let err = registry.set_prompt("missing", "x").await.unwrap_err();
    assert!(matches!(err, RelayError::SessionNotFound(ref s) if s == "missing"));
    assert_eq!(registry.len().await, 1);

    // the live session keeps the default prompt
    let client = factory.client(&id);
    client.receive(text_message("u1", "hi")).await;
    eventually(|| client.sent().len() == 1).await;
    assert_eq!(
        completion.contexts()[0][0],
        ChatTurn::system("You are a helpful assistant.")
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_initializes_client() {
    let (registry, factory, _dir) = setup(MockCompletion::new());

    let id = registry.create().await.unwrap();
    assert!(registry.contains(&id).await);
    assert_eq!(
        factory
            .client(&id)
            .initialized
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    let ctx = registry.get(&id).await.unwrap();
    assert_eq!(ctx.id(), id);
    assert_eq!(ctx.prompt().await, "You are a helpful assistant.");
    assert!(ctx.users().is_empty().await);
}

#[tokio::test]
async fn test_create_fails_when_client_cannot_be_built() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry(
        Arc::new(MockFactory::failing()),
        MockCompletion::new(),
        settings(dir.path()),
    );

    let err = registry.create().await.unwrap_err();
    assert!(matches!(err, RelayError::Client(_)));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_get_after_destroy_is_not_found() {
    let (registry, factory, _dir) = setup(MockCompletion::new());
    let id = registry.create().await.unwrap();

    assert!(registry.destroy(&id).await);
    assert!(matches!(
        registry.get(&id).await,
        Err(RelayError::SessionNotFound(_))
    ));
    assert_eq!(factory.client(&id).destroy_count(), 1);

    // idempotent
    assert!(!registry.destroy(&id).await);
    assert_eq!(factory.client(&id).destroy_count(), 1);
}

#[tokio::test]
async fn test_destroyed_session_routes_nothing() {
    let completion = MockCompletion::new();
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    registry.destroy(&id).await;
    client.receive(text_message("u1", "hi")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(completion.calls(), 0);
    assert!(client.sent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_yield_unique_ids() {
    let (registry, factory, _dir) = setup(MockCompletion::new());

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let registry = registry.clone();
        tasks.spawn(async move { registry.create().await.unwrap() });
    }

    let mut ids = HashSet::new();
    while let Some(id) = tasks.join_next().await {
        ids.insert(id.unwrap());
    }

    assert_eq!(ids.len(), 32);
    assert_eq!(registry.len().await, 32);
    assert_eq!(factory.count(), 32);
}

#[tokio::test]
async fn test_clear_history_errors() {
    let (registry, factory, _dir) = setup(MockCompletion::new());
    let id = registry.create().await.unwrap();

    assert!(matches!(
        registry.clear_history(&id, "nobody").await,
        Err(RelayError::UserNotFound { .. })
    ));
    assert!(matches!(
        registry.clear_history("missing", "nobody").await,
        Err(RelayError::UserNotFound { .. })
    ));

    let client = factory.client(&id);
    client.receive(text_message("u1", "hi")).await;
    eventually(|| client.sent().len() == 1).await;

    registry.clear_history(&id, "u1").await.unwrap();
    assert_eq!(registry.history(&id, "u1").await.unwrap(), vec![]);
}

#[tokio::test]
async fn test_destroy_all() {
    let (registry, factory, _dir) = setup(MockCompletion::new());
    let a = registry.create().await.unwrap();
    let b = registry.create().await.unwrap();

    assert_eq!(registry.destroy_all().await, 2);
    assert!(registry.is_empty().await);
    assert_eq!(factory.client(&a).destroy_count(), 1);
    assert_eq!(factory.client(&b).destroy_count(), 1);
}

#[tokio::test]
async fn test_list_reports_users() {
    let (registry, factory, _dir) = setup(MockCompletion::new());
    let id = registry.create().await.unwrap();

    let client = factory.client(&id);
    client.receive(text_message("u1", "hi")).await;
    client.receive(text_message("u2", "hey")).await;
    eventually(|| client.sent().len() == 2).await;

    let sessions = registry.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, id);
    assert_eq!(sessions[0].client, "mock");
    assert_eq!(sessions[0].users, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// History window
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_context_is_bounded() {
    let completion = MockCompletion::new();
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    for i in 0..15 {
        client.receive(text_message("u1", &format!("m{i}"))).await;
        eventually(|| client.sent().len() == i + 1).await;
    }

    for context in completion.contexts() {
        assert!(context.len() <= 11);
        assert_eq!(context[0].role, Role::System);
        assert_eq!(context.iter().filter(|t| t.role == Role::System).count(), 1);
    }

    let last = completion.contexts().pop().unwrap();
    assert_eq!(last.len(), 11);
    assert_eq!(last[10], ChatTurn::user("m14"));
    // storage keeps everything
    assert_eq!(registry.history(&id, "u1").await.unwrap().len(), 30);
}

#[tokio::test]
async fn test_clear_then_one_message() {
    let completion = MockCompletion::new();
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    for i in 0..3 {
        client.receive(text_message("u1", &format!("m{i}"))).await;
        eventually(|| client.sent().len() == i + 1).await;
    }

    registry.clear_history(&id, "u1").await.unwrap();
    client.receive(text_message("u1", "fresh")).await;
    eventually(|| client.sent().len() == 4).await;

    assert_eq!(
        completion.contexts().pop().unwrap(),
        vec![
            ChatTurn::system("You are a helpful assistant."),
            ChatTurn::user("fresh")
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_user_turns_keep_arrival_order() {
    let bodies = ["one", "two", "three", "four", "five"];

    for _ in 0..10 {
        let completion = MockCompletion::echo(Duration::from_millis(5));
        let (registry, factory, _dir) = setup(completion);
        let id = registry.create().await.unwrap();
        let client = factory.client(&id);

        for body in bodies {
            client.receive(text_message("u1", body)).await;
        }
        eventually(|| client.sent().len() == bodies.len()).await;

        let history = registry.history(&id, "u1").await.unwrap();
        let expected: Vec<ChatTurn> = bodies
            .iter()
            .flat_map(|b| [ChatTurn::user(*b), ChatTurn::assistant(format!("re: {b}"))])
            .collect();
        assert_eq!(history, expected);

        let replies: Vec<OutgoingContent> = client.sent().into_iter().map(|(_, c)| c).collect();
        let expected: Vec<OutgoingContent> = bodies
            .iter()
            .map(|b| OutgoingContent::Text(format!("re: {b}")))
            .collect();
        assert_eq!(replies, expected);

        registry.destroy_all().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_other_users_are_not_blocked() {
    let completion = MockCompletion::slow(Duration::from_secs(10));
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    client.receive(text_message("u1", "a")).await;
    client.receive(text_message("u1", "b")).await;
    client.receive(text_message("u2", "c")).await;
    settle().await;

    // u1's second message waits for its first, u2 runs alongside
    let mut last_turns: Vec<String> = completion
        .contexts()
        .iter()
        .map(|c| c.last().unwrap().content.clone())
        .collect();
    last_turns.sort();
    assert_eq!(last_turns, vec!["a", "c"]);

    tokio::time::sleep(Duration::from_secs(25)).await;
    eventually(|| client.sent().len() == 3).await;
    assert_eq!(completion.contexts()[2].last().unwrap().content, "b");
}

#[tokio::test(start_paused = true)]
async fn test_clear_history_waits_for_in_flight_reply() {
    let completion = MockCompletion::slow(Duration::from_secs(10));
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    client.receive(text_message("u1", "hi")).await;
    settle().await;
    assert_eq!(completion.calls(), 1);

    let started = tokio::time::Instant::now();
    registry.clear_history(&id, "u1").await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(10));

    assert!(registry.history(&id, "u1").await.unwrap().is_empty());
    eventually(|| client.sent().len() == 1).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Client events
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_qr_lifecycle() {
    let (registry, factory, dir) = setup(MockCompletion::new());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    assert!(matches!(
        registry.qr_image(&id).await,
        Err(RelayError::QrNotFound(_))
    ));

    client
        .emit(ClientEvent::Qr {
            code: "2@abc".into(),
            image: Some(b"\x89PNG".to_vec()),
        })
        .await;
    wait_for_qr(&registry, &id, true).await;
    assert_eq!(registry.qr_image(&id).await.unwrap(), b"\x89PNG");

    client.emit(ClientEvent::Ready).await;
    wait_for_qr(&registry, &id, false).await;
    assert!(registry.contains(&id).await);

    client
        .emit(ClientEvent::Qr {
            code: "2@def".into(),
            image: Some(b"\x89PNG".to_vec()),
        })
        .await;
    wait_for_qr(&registry, &id, true).await;

    client
        .emit(ClientEvent::Disconnected {
            reason: Some("LOGOUT".into()),
        })
        .await;
    wait_until_gone(&registry, &id).await;

    assert_eq!(client.destroy_count(), 1);
    assert!(!dir.path().join(format!("qr-{id}.png")).exists());
}

#[tokio::test]
async fn test_ignored_messages_create_no_users() {
    let completion = MockCompletion::new();
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    let mut own = text_message("u1", "echo");
    own.from_me = true;
    let mut group = text_message("g1@g.us", "hello all");
    group.is_group = true;
    client.receive(own).await;
    client.receive(group).await;
    client.receive(text_message("u2", "")).await;
    client.receive(text_message("u3", "real")).await;
    eventually(|| client.sent().len() == 1).await;

    assert_eq!(completion.calls(), 1);
    assert_eq!(registry.list().await[0].users, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Idle expiry
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_idle_session_expires() {
    let completion = MockCompletion::new();
    let (registry, factory, _dir) = setup(completion.clone());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    tokio::time::advance(Duration::from_secs(29 * 60)).await;
    settle().await;
    assert!(registry.contains(&id).await);

    tokio::time::advance(Duration::from_secs(61)).await;
    settle().await;
    assert!(matches!(
        registry.get(&id).await,
        Err(RelayError::SessionNotFound(_))
    ));
    assert_eq!(client.destroy_count(), 1);

    // nothing reaches the router after expiry
    client.receive(text_message("u1", "late")).await;
    settle().await;
    assert_eq!(completion.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_activity_does_not_extend_lifetime() {
    let (registry, factory, _dir) = setup(MockCompletion::new());
    let id = registry.create().await.unwrap();
    let client = factory.client(&id);

    tokio::time::advance(Duration::from_secs(25 * 60)).await;
    client.receive(text_message("u1", "still here")).await;
    settle().await;
    assert_eq!(client.sent().len(), 1);

    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    settle().await;
    assert!(!registry.contains(&id).await);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_without_timeout_persist() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(MockFactory::default());
    let registry = registry(
        factory,
        MockCompletion::new(),
        settings(dir.path()).without_timeout(),
    );
    let id = registry.create().await.unwrap();

    tokio::time::advance(Duration::from_secs(24 * 3600)).await;
    settle().await;
    assert!(registry.contains(&id).await);
}
