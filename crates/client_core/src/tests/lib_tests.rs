use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use shared::{
    domain::MessageId,
    error::ApiError,
    protocol::{MessagePayload, TokenResponse},
};
use tokio::sync::Notify;

use super::*;

#[derive(Default)]
struct FakeApi {
    calls: Mutex<Vec<String>>,
    login_token: Mutex<String>,
    me_fails: Mutex<bool>,
    conversations: Mutex<Vec<ConversationSummary>>,
    conversation_gate: Mutex<Option<Arc<Notify>>>,
    conversation_polls: AtomicUsize,
    messages: Mutex<Vec<MessagePayload>>,
    message_gate: Mutex<Option<(ConversationId, Arc<Notify>)>>,
    message_polls: AtomicUsize,
    send_results: Mutex<VecDeque<Result<(), RequestError>>>,
    send_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeApi {
    fn new() -> Arc<Self> {
        let api = Self::default();
        *api.login_token.lock().expect("lock") = "tok-1".to_string();
        Arc::new(api)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("lock").push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        *self.conversations.lock().expect("lock") = conversations;
    }

    fn set_messages(&self, messages: Vec<MessagePayload>) {
        *self.messages.lock().expect("lock") = messages;
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn health(&self) -> Result<HealthResponse, RequestError> {
        Ok(HealthResponse {
            status: "ok".to_string(),
        })
    }

    async fn register(&self, credentials: &Credentials) -> Result<Profile, RequestError> {
        self.record(format!("register:{}", credentials.username));
        Ok(Profile {
            id: None,
            username: credentials.username.clone(),
        })
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, RequestError> {
        self.record(format!("login:{}", credentials.username));
        Ok(TokenResponse {
            access_token: self.login_token.lock().expect("lock").clone(),
            token_type: "bearer".to_string(),
        })
    }

    async fn me(&self, token: &str) -> Result<Profile, RequestError> {
        self.record(format!("me:{token}"));
        if *self.me_fails.lock().expect("lock") {
            return Err(ApiError::new(401, "Invalid token").into());
        }
        Ok(Profile {
            id: None,
            username: "alice".to_string(),
        })
    }

    async fn list_conversations(
        &self,
        _token: &str,
    ) -> Result<Vec<ConversationSummary>, RequestError> {
        let gate = self.conversation_gate.lock().expect("lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.conversation_polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.conversations.lock().expect("lock").clone())
    }

    async fn create_conversation(
        &self,
        _token: &str,
        username: &str,
    ) -> Result<ConversationSummary, RequestError> {
        self.record(format!("create:{username}"));
        Ok(ConversationSummary {
            id: ConversationId(42),
            other_username: username.to_string(),
        })
    }

    async fn list_messages(
        &self,
        _token: &str,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessagePayload>, RequestError> {
        self.message_polls.fetch_add(1, Ordering::SeqCst);
        let gate = self.message_gate.lock().expect("lock").clone();
        if let Some((gated, gate)) = gate {
            if gated == conversation_id {
                gate.notified().await;
            }
        }
        Ok(self
            .messages
            .lock()
            .expect("lock")
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn send_message(
        &self,
        _token: &str,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Option<MessagePayload>, RequestError> {
        self.record(format!("send:{}:{text}", conversation_id.0));
        let gate = self.send_gate.lock().expect("lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let result = self
            .send_results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(()));
        result.map(|()| None)
    }
}

fn convo(id: i64, other: &str) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId(id),
        other_username: other.to_string(),
    }
}

fn wire_message(id: i64, conversation: i64, sender: &str, text: &str) -> MessagePayload {
    MessagePayload {
        id: MessageId(id),
        conversation_id: ConversationId(conversation),
        sender_username: sender.to_string(),
        text: text.to_string(),
        created_at: "2024-01-01T09:00:00".to_string(),
    }
}

fn fast_intervals() -> PollIntervals {
    PollIntervals {
        conversations: Duration::from_millis(20),
        messages: Duration::from_millis(10),
    }
}

fn client_with(api: Arc<FakeApi>, store: Arc<MemorySessionStore>) -> Arc<MessengerClient> {
    MessengerClient::new(api, store, fast_intervals())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn signed_in(api: Arc<FakeApi>) -> (Arc<MessengerClient>, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::default());
    let client = client_with(api, store.clone());
    let phase = client
        .authenticate(AuthMode::Login, "alice", "pw")
        .await
        .expect("login");
    assert_eq!(phase, SessionPhase::Authenticated);
    (client, store)
}

#[tokio::test]
async fn blank_credentials_are_rejected_before_any_request() {
    let api = FakeApi::new();
    let client = client_with(api.clone(), Arc::new(MemorySessionStore::default()));

    for (user, pass) in [("", "pw"), ("  ", "pw"), ("alice", "")] {
        let err = client
            .authenticate(AuthMode::Login, user, pass)
            .await
            .expect_err("validation");
        assert_eq!(err.to_string(), MISSING_CREDENTIALS_MESSAGE);
    }
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn register_logs_in_afterwards_and_persists_token() {
    let api = FakeApi::new();
    let store = Arc::new(MemorySessionStore::default());
    let client = client_with(api.clone(), store.clone());

    let phase = client
        .authenticate(AuthMode::Register, " alice ", "pw")
        .await
        .expect("register");

    assert_eq!(phase, SessionPhase::Authenticated);
    assert_eq!(
        api.calls(),
        vec!["register:alice", "login:alice", "me:tok-1"]
    );
    assert_eq!(store.load().expect("load"), Some("tok-1".to_string()));
    assert_eq!(client.snapshot().username(), Some("alice"));
}

#[tokio::test]
async fn missing_access_token_is_an_auth_error() {
    let api = FakeApi::new();
    api.login_token.lock().expect("lock").clear();
    let store = Arc::new(MemorySessionStore::default());
    let client = client_with(api.clone(), store.clone());

    let err = client
        .authenticate(AuthMode::Login, "alice", "pw")
        .await
        .expect_err("no token");
    assert!(matches!(err, ClientError::MissingAccessToken));
    assert_eq!(store.load().expect("load"), None);
    assert_eq!(client.snapshot().phase, SessionPhase::Unauthenticated);
}

#[tokio::test]
async fn failed_profile_fetch_drops_the_session() {
    let api = FakeApi::new();
    *api.me_fails.lock().expect("lock") = true;
    let store = Arc::new(MemorySessionStore::with_token("stale"));
    let client = client_with(api.clone(), store.clone());
    let mut events = client.subscribe_events();

    let phase = client.restore_session().await.expect("restore");

    assert_eq!(phase, SessionPhase::Unauthenticated);
    assert_eq!(store.load().expect("load"), None);
    assert_eq!(client.snapshot(), ChatSnapshot::default());
    assert!(matches!(
        events.recv().await.expect("event"),
        ClientEvent::SessionChanged {
            phase: SessionPhase::Resolving,
            ..
        }
    ));
    assert!(matches!(
        events.recv().await.expect("event"),
        ClientEvent::SessionChanged {
            phase: SessionPhase::Unauthenticated,
            ..
        }
    ));
}

#[tokio::test]
async fn restore_without_token_stays_signed_out() {
    let api = FakeApi::new();
    let client = client_with(api.clone(), Arc::new(MemorySessionStore::default()));
    let phase = client.restore_session().await.expect("restore");
    assert_eq!(phase, SessionPhase::Unauthenticated);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn polling_auto_selects_first_conversation_and_loads_its_thread() {
    let api = FakeApi::new();
    api.set_conversations(vec![convo(5, "bob"), convo(6, "carol")]);
    api.set_messages(vec![
        wire_message(1, 5, "bob", "hi alice"),
        wire_message(2, 6, "carol", "elsewhere"),
    ]);
    let (client, _) = signed_in(api.clone()).await;

    wait_until(|| client.snapshot().messages.len() == 1).await;
    let snapshot = client.snapshot();
    assert_eq!(snapshot.selected, Some(ConversationId(5)));
    assert_eq!(snapshot.conversations.len(), 2);
    assert_eq!(snapshot.messages[0].text, "hi alice");
    assert!(!snapshot.messages[0].is_from("alice"));
}

#[tokio::test]
async fn conversation_poll_keeps_running_on_schedule() {
    let api = FakeApi::new();
    let (client, _) = signed_in(api.clone()).await;

    wait_until(|| api.conversation_polls.load(Ordering::SeqCst) >= 3).await;
    drop(client);
}

#[tokio::test]
async fn logout_clears_everything_before_returning() {
    let api = FakeApi::new();
    api.set_conversations(vec![convo(5, "bob")]);
    api.set_messages(vec![wire_message(1, 5, "bob", "hi")]);
    let (client, store) = signed_in(api.clone()).await;
    wait_until(|| !client.snapshot().messages.is_empty()).await;

    client.logout();

    assert_eq!(client.snapshot(), ChatSnapshot::default());
    assert_eq!(store.load().expect("load"), None);

    let polls = api.message_polls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(api.message_polls.load(Ordering::SeqCst), polls);
}

#[tokio::test]
async fn poll_result_arriving_after_logout_is_discarded() {
    let api = FakeApi::new();
    let gate = Arc::new(Notify::new());
    *api.conversation_gate.lock().expect("lock") = Some(gate.clone());
    api.set_conversations(vec![convo(5, "bob")]);
    let (client, _) = signed_in(api.clone()).await;

    // Let the first poll park on the gate, then sign out underneath it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.logout();
    gate.notify_one();
    wait_until(|| api.conversation_polls.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let snapshot = client.snapshot();
    assert!(snapshot.conversations.is_empty());
    assert_eq!(snapshot.selected, None);
}

#[tokio::test]
async fn thread_fetch_finishing_after_a_switch_is_discarded() {
    let api = FakeApi::new();
    let gate = Arc::new(Notify::new());
    *api.message_gate.lock().expect("lock") = Some((ConversationId(5), gate.clone()));
    api.set_messages(vec![
        wire_message(1, 5, "bob", "old"),
        wire_message(2, 6, "carol", "new"),
    ]);
    let (client, _) = signed_in(api.clone()).await;

    client.select_conversation(ConversationId(5));
    wait_until(|| api.message_polls.load(Ordering::SeqCst) >= 1).await;
    client.select_conversation(ConversationId(6));
    wait_until(|| client.snapshot().messages.len() == 1).await;

    let mut events = client.subscribe_events();
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(40)).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.selected, Some(ConversationId(6)));
    let texts: Vec<&str> = snapshot.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["new"]);
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::MessagesUpdated { conversation_id, .. } = event {
            assert_eq!(conversation_id, ConversationId(6));
        }
    }
}

#[tokio::test]
async fn replay_describes_the_current_session() {
    let api = FakeApi::new();
    api.set_conversations(vec![convo(5, "bob")]);
    api.set_messages(vec![wire_message(1, 5, "bob", "hi")]);
    let (client, _) = signed_in(api.clone()).await;
    wait_until(|| !client.snapshot().messages.is_empty()).await;

    let replay = client.replay_events();
    assert!(matches!(
        &replay[0],
        ClientEvent::SessionChanged { phase: SessionPhase::Authenticated, profile: Some(p) }
            if p.username == "alice"
    ));
    assert!(replay.iter().any(|event| matches!(
        event,
        ClientEvent::MessagesUpdated { conversation_id: ConversationId(5), messages, .. }
            if messages.len() == 1
    )));

    client.logout();
    let replay = client.replay_events();
    assert!(matches!(
        &replay[0],
        ClientEvent::SessionChanged { phase: SessionPhase::Unauthenticated, profile: None }
    ));
    assert!(!replay
        .iter()
        .any(|event| matches!(event, ClientEvent::MessagesUpdated { .. })));
}

#[tokio::test]
async fn staged_message_is_visible_before_the_send_completes() {
    let api = FakeApi::new();
    let gate = Arc::new(Notify::new());
    *api.send_gate.lock().expect("lock") = Some(gate.clone());
    let (client, _) = signed_in(api.clone()).await;
    client.select_conversation(ConversationId(5));

    let outgoing = client.stage_message("  hello  ").expect("staged");
    let snapshot = client.snapshot();
    let last = snapshot.messages.last().expect("optimistic entry");
    assert_eq!(last.text, "hello");
    assert_eq!(last.conversation_id, ConversationId(5));
    assert!(last.is_optimistic());
    assert!(last.is_from("alice"));

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.deliver(outgoing).await }
    });
    gate.notify_one();
    pending.await.expect("join").expect("deliver");
    assert!(api.calls().contains(&"send:5:hello".to_string()));
}

#[tokio::test]
async fn blank_or_unselected_sends_are_ignored() {
    let api = FakeApi::new();
    let (client, _) = signed_in(api.clone()).await;

    assert!(!client.send_message("hello").await.expect("no selection"));
    client.select_conversation(ConversationId(5));
    assert!(!client.send_message("   ").await.expect("blank"));
    assert!(!api.calls().iter().any(|c| c.starts_with("send:")));
}

#[tokio::test]
async fn failed_send_keeps_the_optimistic_entry() {
    let api = FakeApi::new();
    api.send_results
        .lock()
        .expect("lock")
        .push_back(Err(ApiError::new(403, "Not a participant").into()));
    let (client, _) = signed_in(api.clone()).await;
    client.select_conversation(ConversationId(5));

    let err = client.send_message("hello").await.expect_err("send fails");
    assert_eq!(err.to_string(), "Not a participant");
    let snapshot = client.snapshot();
    assert!(snapshot
        .messages
        .iter()
        .any(|m| m.is_optimistic() && m.text == "hello"));
}

#[tokio::test]
async fn next_poll_replaces_optimistic_entries() {
    let api = FakeApi::new();
    let (client, _) = signed_in(api.clone()).await;
    client.select_conversation(ConversationId(5));
    client.stage_message("hello").expect("staged");

    api.set_messages(vec![wire_message(8, 5, "alice", "hello")]);
    wait_until(|| {
        let messages = client.snapshot().messages;
        messages.len() == 1 && !messages[0].is_optimistic()
    })
    .await;
}

#[tokio::test]
async fn start_chat_prepends_once_and_selects() {
    let api = FakeApi::new();
    api.set_conversations(vec![convo(1, "bob")]);
    let (client, _) = signed_in(api.clone()).await;
    wait_until(|| client.snapshot().selected == Some(ConversationId(1))).await;
    // The backend lists the new conversation from here on.
    api.set_conversations(vec![convo(42, "dave"), convo(1, "bob")]);

    let started = client.start_chat(" dave ").await.expect("start");
    assert_eq!(started.map(|c| c.id), Some(ConversationId(42)));
    client.start_chat("dave").await.expect("start again");

    let snapshot = client.snapshot();
    assert_eq!(snapshot.selected, Some(ConversationId(42)));
    let ids: Vec<i64> = snapshot.conversations.iter().map(|c| c.id.0).collect();
    assert_eq!(ids, vec![42, 1]);
    assert_eq!(
        api.calls().iter().filter(|c| *c == "create:dave").count(),
        2
    );
}

#[tokio::test]
async fn blank_start_chat_is_a_no_op() {
    let api = FakeApi::new();
    let (client, _) = signed_in(api.clone()).await;
    assert!(client.start_chat("   ").await.expect("blank").is_none());
    assert!(!api.calls().iter().any(|c| c.starts_with("create:")));
}

#[tokio::test]
async fn commands_require_a_session() {
    let api = FakeApi::new();
    let client = client_with(api, Arc::new(MemorySessionStore::default()));
    assert!(matches!(
        client.start_chat("bob").await,
        Err(ClientError::NotAuthenticated)
    ));
    assert!(matches!(
        client.refresh_conversations().await,
        Err(ClientError::NotAuthenticated)
    ));
    assert!(client.stage_message("hi").is_none());
}

#[tokio::test]
async fn selecting_while_signed_out_does_not_poll() {
    let api = FakeApi::new();
    let client = client_with(api.clone(), Arc::new(MemorySessionStore::default()));
    client.select_conversation(ConversationId(3));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(api.message_polls.load(Ordering::SeqCst), 0);
    assert_eq!(client.snapshot().selected, None);
}
