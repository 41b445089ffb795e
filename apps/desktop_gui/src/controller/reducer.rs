//! View model for the desktop window.
//!
//! Everything the frame renders lives here, so keystrokes only touch the
//! draft strings and never rebuild the sidebar or thread state. UI actions
//! come back as [`BackendCommand`]s for the caller to dispatch.

use client_core::{
    AuthMode, DisplayMessage, LoadingTarget, MessagesUpdateReason, SessionPhase,
    MISSING_CREDENTIALS_MESSAGE,
};
use shared::{
    domain::ConversationId,
    protocol::{ConversationSummary, Profile},
};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorCategory, UiErrorContext, UiEvent};
use crate::controller::scroll::ScrollFollow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppViewState {
    Login,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    Username,
    NewChat,
    Composer,
}

#[derive(Debug, Clone)]
pub struct AuthForm {
    pub mode: AuthMode,
    pub username: String,
    pub password: String,
    pub error: Option<String>,
    pub busy: bool,
}

impl Default for AuthForm {
    fn default() -> Self {
        Self {
            mode: AuthMode::Login,
            username: String::new(),
            password: String::new(),
            error: None,
            busy: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatView {
    pub phase: SessionPhase,
    pub profile: Option<Profile>,
    pub conversations: Vec<ConversationSummary>,
    pub selected: Option<ConversationId>,
    pub messages: Vec<DisplayMessage>,
    pub loading_conversations: bool,
    pub loading_messages: bool,
    pub auth: AuthForm,
    /// Result of the last `/health` check.
    pub backend_status: Option<Result<String, String>>,
    pub new_chat: String,
    pub chat_error: Option<String>,
    pub composer: String,
    pub send_error: Option<String>,
    pub status: String,
    pub scroll: ScrollFollow,
    focus: Option<FocusTarget>,
}

impl Default for ChatView {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            profile: None,
            conversations: Vec::new(),
            selected: None,
            messages: Vec::new(),
            loading_conversations: false,
            loading_messages: false,
            auth: AuthForm::default(),
            backend_status: None,
            new_chat: String::new(),
            chat_error: None,
            composer: String::new(),
            send_error: None,
            status: "Not signed in".to_string(),
            scroll: ScrollFollow::default(),
            focus: Some(FocusTarget::Username),
        }
    }
}

impl ChatView {
    pub fn view_state(&self) -> AppViewState {
        match self.phase {
            SessionPhase::Authenticated => AppViewState::Main,
            SessionPhase::Unauthenticated | SessionPhase::Resolving => AppViewState::Login,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.profile.as_ref().map(|profile| profile.username.as_str())
    }

    pub fn selected_conversation(&self) -> Option<&ConversationSummary> {
        let selected = self.selected?;
        self.conversations.iter().find(|c| c.id == selected)
    }

    /// Messages belonging to the selected conversation.
    pub fn thread(&self) -> impl Iterator<Item = &DisplayMessage> {
        let selected = self.selected;
        self.messages
            .iter()
            .filter(move |m| Some(m.conversation_id) == selected)
    }

    /// A fetch is in flight and there is nothing to show yet.
    pub fn conversations_pending(&self) -> bool {
        self.loading_conversations && self.conversations.is_empty()
    }

    pub fn messages_pending(&self) -> bool {
        self.loading_messages && self.thread().next().is_none()
    }

    pub fn can_compose(&self) -> bool {
        self.selected.is_some()
    }

    /// Hands out a pending focus request once.
    pub fn take_focus(&mut self) -> Option<FocusTarget> {
        self.focus.take()
    }

    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Info(message) => self.status = message,
            UiEvent::BackendHealth(result) => self.backend_status = Some(result),
            UiEvent::SessionChanged { phase, profile } => self.apply_session(phase, profile),
            UiEvent::ConversationsUpdated {
                conversations,
                selected,
            } => {
                self.conversations = conversations;
                self.apply_selection(selected);
            }
            UiEvent::SelectionChanged(selected) => self.apply_selection(selected),
            UiEvent::MessagesUpdated {
                conversation_id,
                messages,
                reason,
            } => {
                if self.selected != Some(conversation_id) {
                    return;
                }
                self.messages = messages;
                match reason {
                    MessagesUpdateReason::Poll => self.scroll.on_messages_updated(),
                    MessagesUpdateReason::OptimisticSend => self.scroll.force(),
                }
            }
            UiEvent::LoadingChanged { target, loading } => match target {
                LoadingTarget::Conversations => self.loading_conversations = loading,
                LoadingTarget::Messages => self.loading_messages = loading,
            },
            UiEvent::AuthFinished => self.auth.busy = false,
            UiEvent::ChatStarted(conversation) => {
                self.new_chat.clear();
                self.chat_error = None;
                self.status = format!("Chatting with {}", conversation.other_username);
                self.focus = Some(FocusTarget::NewChat);
            }
            UiEvent::Error(err) => {
                if err.requires_reauth() {
                    self.status = "Session rejected by the server; log in again".to_string();
                } else if err.category() == UiErrorCategory::Transport {
                    self.status = "Backend unreachable".to_string();
                }
                self.apply_error_inline(&err);
            }
        }
    }

    fn apply_error_inline(&mut self, err: &UiError) {
        match err.context() {
            UiErrorContext::Auth => {
                self.auth.error = Some(err.message().to_string());
                self.auth.busy = false;
            }
            UiErrorContext::StartChat => self.chat_error = Some(err.message().to_string()),
            UiErrorContext::SendMessage => self.send_error = Some(err.message().to_string()),
            UiErrorContext::BackendStartup | UiErrorContext::General => {
                self.status = err.message().to_string();
            }
        }
    }

    fn apply_session(&mut self, phase: SessionPhase, profile: Option<Profile>) {
        let was_authenticated = self.phase == SessionPhase::Authenticated;
        self.phase = phase;
        self.profile = profile;
        match phase {
            SessionPhase::Authenticated => {
                if !was_authenticated {
                    self.auth.password.clear();
                    self.auth.error = None;
                    self.auth.busy = false;
                    self.focus = Some(FocusTarget::NewChat);
                }
                self.status = match self.username() {
                    Some(name) => format!("Signed in as {name}"),
                    None => "Signed in".to_string(),
                };
            }
            SessionPhase::Resolving => self.status = "Checking session...".to_string(),
            SessionPhase::Unauthenticated => {
                self.reset_chat();
                self.status = "Not signed in".to_string();
                if was_authenticated {
                    self.focus = Some(FocusTarget::Username);
                }
            }
        }
    }

    fn apply_selection(&mut self, selected: Option<ConversationId>) {
        if self.selected == selected {
            return;
        }
        self.selected = selected;
        self.send_error = None;
        self.scroll.force();
    }

    fn reset_chat(&mut self) {
        self.profile = None;
        self.conversations.clear();
        self.selected = None;
        self.messages.clear();
        self.loading_conversations = false;
        self.loading_messages = false;
        self.new_chat.clear();
        self.chat_error = None;
        self.composer.clear();
        self.send_error = None;
    }

    pub fn set_auth_mode(&mut self, mode: AuthMode) {
        if self.auth.mode != mode {
            self.auth.mode = mode;
            self.auth.error = None;
        }
    }

    pub fn submit_auth(&mut self) -> Option<BackendCommand> {
        if self.auth.busy {
            return None;
        }
        let username = self.auth.username.trim().to_string();
        if username.is_empty() || self.auth.password.is_empty() {
            self.auth.error = Some(MISSING_CREDENTIALS_MESSAGE.to_string());
            self.focus = Some(FocusTarget::Username);
            return None;
        }
        self.auth.error = None;
        self.auth.busy = true;
        Some(BackendCommand::Authenticate {
            mode: self.auth.mode,
            username,
            password: self.auth.password.clone(),
        })
    }

    /// Clears the view right away; the backend drops its state on receipt.
    pub fn logout(&mut self) -> BackendCommand {
        self.phase = SessionPhase::Unauthenticated;
        self.reset_chat();
        self.auth.password.clear();
        self.status = "Signed out".to_string();
        self.focus = Some(FocusTarget::Username);
        BackendCommand::Logout
    }

    pub fn submit_new_chat(&mut self) -> Option<BackendCommand> {
        let username = self.new_chat.trim();
        if username.is_empty() {
            return None;
        }
        self.chat_error = None;
        Some(BackendCommand::StartChat {
            username: username.to_string(),
        })
    }

    pub fn select(&mut self, conversation_id: ConversationId) -> Option<BackendCommand> {
        if self.selected == Some(conversation_id) {
            return None;
        }
        self.apply_selection(Some(conversation_id));
        Some(BackendCommand::SelectConversation { conversation_id })
    }

    pub fn submit_message(&mut self) -> Option<BackendCommand> {
        self.selected?;
        let text = self.composer.trim();
        if text.is_empty() {
            return None;
        }
        let text = text.to_string();
        self.composer.clear();
        self.send_error = None;
        self.scroll.force();
        self.focus = Some(FocusTarget::Composer);
        Some(BackendCommand::SendMessage { text })
    }
}
