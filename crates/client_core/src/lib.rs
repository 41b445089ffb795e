use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use chrono::Utc;
use shared::{
    domain::ConversationId,
    protocol::{ConversationSummary, Credentials, HealthResponse, Profile},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod api;
pub mod config;
pub mod error;
pub mod poller;
pub mod session;
pub mod state;

pub use api::{ChatApi, HttpApi};
pub use config::ClientSettings;
pub use error::{ClientError, RequestError, SessionStoreError};
pub use poller::{Liveness, PollTask};
pub use session::{FileSessionStore, MemorySessionStore, SessionPhase, SessionStore};
pub use state::{ChatSnapshot, DisplayMessage};

pub const MISSING_CREDENTIALS_MESSAGE: &str = "Please enter username and password.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingTarget {
    Conversations,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagesUpdateReason {
    Poll,
    OptimisticSend,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionChanged {
        phase: SessionPhase,
        profile: Option<Profile>,
    },
    ConversationsUpdated {
        conversations: Vec<ConversationSummary>,
        selected: Option<ConversationId>,
    },
    SelectionChanged(Option<ConversationId>),
    MessagesUpdated {
        conversation_id: ConversationId,
        messages: Vec<DisplayMessage>,
        reason: MessagesUpdateReason,
    },
    LoadingChanged {
        target: LoadingTarget,
        loading: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub conversations: Duration,
    pub messages: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            conversations: config::DEFAULT_CONVERSATION_POLL,
            messages: config::DEFAULT_MESSAGE_POLL,
        }
    }
}

impl From<&ClientSettings> for PollIntervals {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            conversations: settings.conversation_poll_interval,
            messages: settings.message_poll_interval,
        }
    }
}

/// A message appended optimistically and still waiting to be delivered.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub text: String,
    pub local: DisplayMessage,
    token: String,
}

struct ClientState {
    chat: ChatSnapshot,
    /// Bumped on every credential change so late profile results can be
    /// told apart from the current session's.
    session_epoch: u64,
    conversation_poller: Option<PollTask>,
    message_poller: Option<PollTask>,
}

impl ClientState {
    fn stop_pollers(&mut self) {
        if let Some(task) = self.conversation_poller.take() {
            task.stop();
        }
        if let Some(task) = self.message_poller.take() {
            task.stop();
        }
    }
}

/// Session owner and the two poll loops behind every client surface.
///
/// State lives behind a mutex that is never held across an await, so each
/// mutation is atomic with respect to the pollers and to user commands.
pub struct MessengerClient {
    api: Arc<dyn ChatApi>,
    store: Arc<dyn SessionStore>,
    intervals: PollIntervals,
    inner: Mutex<ClientState>,
    events: broadcast::Sender<ClientEvent>,
}

impl MessengerClient {
    pub fn new(
        api: Arc<dyn ChatApi>,
        store: Arc<dyn SessionStore>,
        intervals: PollIntervals,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            store,
            intervals,
            inner: Mutex::new(ClientState {
                chat: ChatSnapshot::default(),
                session_epoch: 0,
                conversation_poller: None,
                message_poller: None,
            }),
            events,
        })
    }

    /// HTTP backend plus a file-backed session under the settings' data dir.
    pub fn from_settings(settings: &ClientSettings) -> Result<Arc<Self>, ClientError> {
        let api = HttpApi::new(&settings.api_base, settings.request_timeout)?;
        let store = FileSessionStore::new(settings.session_path());
        Ok(Self::new(
            Arc::new(api),
            Arc::new(store),
            PollIntervals::from(settings),
        ))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.state().chat.clone()
    }

    /// The current state as events, for subscribers that missed some.
    pub fn replay_events(&self) -> Vec<ClientEvent> {
        let chat = self.snapshot();
        let mut events = vec![
            ClientEvent::SessionChanged {
                phase: chat.phase,
                profile: chat.profile,
            },
            ClientEvent::ConversationsUpdated {
                conversations: chat.conversations,
                selected: chat.selected,
            },
            ClientEvent::SelectionChanged(chat.selected),
        ];
        if let Some(conversation_id) = chat.selected {
            events.push(ClientEvent::MessagesUpdated {
                conversation_id,
                messages: chat.messages,
                reason: MessagesUpdateReason::Poll,
            });
        }
        events.push(ClientEvent::LoadingChanged {
            target: LoadingTarget::Conversations,
            loading: chat.loading_conversations,
        });
        events.push(ClientEvent::LoadingChanged {
            target: LoadingTarget::Messages,
            loading: chat.loading_messages,
        });
        events
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn emit_session(&self, chat: &ChatSnapshot) {
        self.emit(ClientEvent::SessionChanged {
            phase: chat.phase,
            profile: chat.profile.clone(),
        });
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        Ok(self.api.health().await?)
    }

    /// Resumes a persisted session, if any.
    pub async fn restore_session(self: &Arc<Self>) -> Result<SessionPhase, ClientError> {
        let token = match self.store.load() {
            Ok(token) => token,
            Err(err) => {
                warn!("failed to read persisted session: {err}");
                None
            }
        };
        let Some(token) = token else {
            return Ok(SessionPhase::Unauthenticated);
        };
        info!("resuming persisted session");
        let epoch = self.begin_session(token.clone());
        self.resolve_session(token, epoch).await
    }

    /// Logs in (after registering, for [`AuthMode::Register`]) and resolves
    /// the profile.
    pub async fn authenticate(
        self: &Arc<Self>,
        mode: AuthMode,
        username: &str,
        password: &str,
    ) -> Result<SessionPhase, ClientError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Validation(MISSING_CREDENTIALS_MESSAGE.to_string()));
        }
        let credentials = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };

        if mode == AuthMode::Register {
            let profile = self.api.register(&credentials).await?;
            info!(username = %profile.username, "registered account");
        }
        let token = self.api.login(&credentials).await?.access_token;
        if token.trim().is_empty() {
            return Err(ClientError::MissingAccessToken);
        }

        if let Err(err) = self.store.save(&token) {
            warn!("failed to persist session token: {err}");
        }
        let epoch = self.begin_session(token.clone());
        self.resolve_session(token, epoch).await
    }

    fn begin_session(&self, token: String) -> u64 {
        let mut guard = self.state();
        guard.stop_pollers();
        guard.chat.clear_session();
        guard.chat.token = Some(token);
        guard.chat.phase = SessionPhase::Resolving;
        guard.session_epoch += 1;
        self.emit_session(&guard.chat);
        guard.session_epoch
    }

    async fn resolve_session(
        self: &Arc<Self>,
        token: String,
        epoch: u64,
    ) -> Result<SessionPhase, ClientError> {
        let result = self.api.me(&token).await;

        let mut guard = self.state();
        if guard.session_epoch != epoch {
            debug!("discarding profile result for a replaced session");
            return Ok(guard.chat.phase);
        }

        match result {
            Ok(profile) => {
                info!(username = %profile.username, "session authenticated");
                guard.chat.profile = Some(profile);
                guard.chat.phase = SessionPhase::Authenticated;
                self.emit_session(&guard.chat);
                let poller = self.spawn_conversation_poller();
                guard.conversation_poller = Some(poller);
            }
            Err(err) => {
                warn!("profile fetch failed, invalidating session: {err}");
                guard.stop_pollers();
                guard.chat.clear_session();
                guard.session_epoch += 1;
                if let Err(err) = self.store.clear() {
                    warn!("failed to clear persisted session: {err}");
                }
                self.emit_session(&guard.chat);
            }
        }
        Ok(guard.chat.phase)
    }

    /// Clears session, conversations, selection and messages before
    /// returning, and stops both pollers.
    pub fn logout(&self) {
        {
            let mut guard = self.state();
            guard.stop_pollers();
            guard.chat.clear_session();
            guard.session_epoch += 1;
            self.emit_session(&guard.chat);
        }
        if let Err(err) = self.store.clear() {
            warn!("failed to clear persisted session: {err}");
        }
        info!("logged out");
    }

    fn spawn_conversation_poller(self: &Arc<Self>) -> PollTask {
        let client = Arc::downgrade(self);
        PollTask::spawn(
            "conversations",
            self.intervals.conversations,
            move |liveness| {
                let client = client.clone();
                async move {
                    if let Some(client) = client.upgrade() {
                        client.poll_conversations_once(&liveness).await;
                    }
                }
            },
        )
    }

    async fn poll_conversations_once(self: &Arc<Self>, liveness: &Liveness) {
        let Some(token) = self.begin_load(LoadingTarget::Conversations) else {
            return;
        };
        let result = self.api.list_conversations(&token).await;
        if !liveness.is_alive() {
            return;
        }

        let mut guard = self.state();
        match result {
            Ok(conversations) => {
                let auto_selected = guard.chat.replace_conversations(conversations);
                self.emit(ClientEvent::ConversationsUpdated {
                    conversations: guard.chat.conversations.clone(),
                    selected: guard.chat.selected,
                });
                if let Some(id) = auto_selected {
                    debug!(conversation_id = id.0, "auto-selected first conversation");
                    self.emit(ClientEvent::SelectionChanged(Some(id)));
                    self.restart_message_poller(&mut guard, id);
                }
            }
            Err(err) => debug!("conversation poll failed: {err}"),
        }
        self.end_load(&mut guard, LoadingTarget::Conversations);
    }

    fn restart_message_poller(self: &Arc<Self>, state: &mut ClientState, id: ConversationId) {
        if let Some(task) = state.message_poller.take() {
            task.stop();
        }
        if state.chat.phase != SessionPhase::Authenticated {
            return;
        }
        let client: Weak<Self> = Arc::downgrade(self);
        state.message_poller = Some(PollTask::spawn(
            "messages",
            self.intervals.messages,
            move |liveness| {
                let client = client.clone();
                async move {
                    if let Some(client) = client.upgrade() {
                        client.poll_messages_once(id, &liveness).await;
                    }
                }
            },
        ));
    }

    async fn poll_messages_once(&self, id: ConversationId, liveness: &Liveness) {
        let Some(token) = self.begin_load(LoadingTarget::Messages) else {
            return;
        };
        let result = self.api.list_messages(&token, id).await;
        if !liveness.is_alive() {
            return;
        }

        let mut guard = self.state();
        match result {
            Ok(messages) if guard.chat.selected == Some(id) => {
                guard.chat.replace_messages(messages);
                self.emit(ClientEvent::MessagesUpdated {
                    conversation_id: id,
                    messages: guard.chat.messages.clone(),
                    reason: MessagesUpdateReason::Poll,
                });
            }
            Ok(_) => debug!(conversation_id = id.0, "dropping messages for deselected conversation"),
            Err(err) => debug!(conversation_id = id.0, "message poll failed: {err}"),
        }
        self.end_load(&mut guard, LoadingTarget::Messages);
    }

    fn begin_load(&self, target: LoadingTarget) -> Option<String> {
        let mut guard = self.state();
        let token = guard.chat.token.clone()?;
        match target {
            LoadingTarget::Conversations => guard.chat.loading_conversations = true,
            LoadingTarget::Messages => guard.chat.loading_messages = true,
        }
        self.emit(ClientEvent::LoadingChanged {
            target,
            loading: true,
        });
        Some(token)
    }

    fn end_load(&self, state: &mut ClientState, target: LoadingTarget) {
        match target {
            LoadingTarget::Conversations => state.chat.loading_conversations = false,
            LoadingTarget::Messages => state.chat.loading_messages = false,
        }
        self.emit(ClientEvent::LoadingChanged {
            target,
            loading: false,
        });
    }

    /// Fetches the conversation list once, outside the poll loop.
    pub async fn refresh_conversations(self: &Arc<Self>) -> Result<Vec<ConversationSummary>, ClientError> {
        let token = self.current_token()?;
        let conversations = self.api.list_conversations(&token).await?;
        let mut guard = self.state();
        if guard.chat.token.as_deref() == Some(token.as_str()) {
            let auto_selected = guard.chat.replace_conversations(conversations.clone());
            self.emit(ClientEvent::ConversationsUpdated {
                conversations: guard.chat.conversations.clone(),
                selected: guard.chat.selected,
            });
            if let Some(id) = auto_selected {
                self.emit(ClientEvent::SelectionChanged(Some(id)));
                self.restart_message_poller(&mut guard, id);
            }
        }
        Ok(conversations)
    }

    /// Fetches the selected thread once, outside the poll loop.
    pub async fn refresh_messages(&self) -> Result<Vec<DisplayMessage>, ClientError> {
        let (token, id) = {
            let guard = self.state();
            let token = guard.chat.token.clone().ok_or(ClientError::NotAuthenticated)?;
            let id = guard.chat.selected.ok_or(ClientError::NoConversationSelected)?;
            (token, id)
        };
        let messages = self.api.list_messages(&token, id).await?;
        let mut guard = self.state();
        if guard.chat.selected == Some(id) {
            guard.chat.replace_messages(messages);
            self.emit(ClientEvent::MessagesUpdated {
                conversation_id: id,
                messages: guard.chat.messages.clone(),
                reason: MessagesUpdateReason::Poll,
            });
        }
        Ok(guard.chat.messages.clone())
    }

    fn current_token(&self) -> Result<String, ClientError> {
        self.state()
            .chat
            .token
            .clone()
            .ok_or(ClientError::NotAuthenticated)
    }

    /// Makes `id` the selection and restarts the message poller for it.
    /// Must be called from within a tokio runtime. Ignored while signed out.
    pub fn select_conversation(self: &Arc<Self>, id: ConversationId) {
        let mut guard = self.state();
        if guard.chat.phase != SessionPhase::Authenticated {
            debug!(conversation_id = id.0, "ignoring selection without a session");
            return;
        }
        if guard.chat.selected == Some(id) && guard.message_poller.is_some() {
            return;
        }
        guard.chat.selected = Some(id);
        self.emit(ClientEvent::SelectionChanged(Some(id)));
        self.restart_message_poller(&mut guard, id);
    }

    /// Creates (or reopens) a conversation with `username` and selects it.
    /// A blank name is ignored.
    pub async fn start_chat(
        self: &Arc<Self>,
        username: &str,
    ) -> Result<Option<ConversationSummary>, ClientError> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(None);
        }
        let (token, epoch) = {
            let guard = self.state();
            let token = guard.chat.token.clone().ok_or(ClientError::NotAuthenticated)?;
            (token, guard.session_epoch)
        };

        let conversation = self.api.create_conversation(&token, username).await?;

        let mut guard = self.state();
        if guard.session_epoch == epoch {
            guard.chat.adopt_started_conversation(conversation.clone());
            self.emit(ClientEvent::ConversationsUpdated {
                conversations: guard.chat.conversations.clone(),
                selected: guard.chat.selected,
            });
            self.emit(ClientEvent::SelectionChanged(Some(conversation.id)));
            self.restart_message_poller(&mut guard, conversation.id);
        }
        Ok(Some(conversation))
    }

    /// Appends a provisional message to the selected thread right away.
    ///
    /// Returns `None` for blank text or when nothing is selected.
    pub fn stage_message(&self, text: &str) -> Option<OutgoingMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let mut guard = self.state();
        let conversation_id = guard.chat.selected?;
        let token = guard.chat.token.clone()?;
        let sender = guard.chat.username().unwrap_or_default().to_string();

        let local = DisplayMessage::optimistic(conversation_id, sender, text, Utc::now());
        guard.chat.push_optimistic(local.clone());
        self.emit(ClientEvent::MessagesUpdated {
            conversation_id,
            messages: guard.chat.messages.clone(),
            reason: MessagesUpdateReason::OptimisticSend,
        });
        Some(OutgoingMessage {
            conversation_id,
            text: text.to_string(),
            local,
            token,
        })
    }

    /// Posts a staged message. On failure the optimistic entry stays in
    /// the thread until the next poll replaces it.
    pub async fn deliver(&self, outgoing: OutgoingMessage) -> Result<(), ClientError> {
        self.api
            .send_message(&outgoing.token, outgoing.conversation_id, &outgoing.text)
            .await?;
        debug!(conversation_id = outgoing.conversation_id.0, "message delivered");
        Ok(())
    }

    /// [`stage_message`](Self::stage_message) followed by
    /// [`deliver`](Self::deliver). Returns whether anything was sent.
    pub async fn send_message(&self, text: &str) -> Result<bool, ClientError> {
        let Some(outgoing) = self.stage_message(text) else {
            return Ok(false);
        };
        self.deliver(outgoing).await?;
        Ok(true)
    }
}

impl Drop for MessengerClient {
    fn drop(&mut self) {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_pollers();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
