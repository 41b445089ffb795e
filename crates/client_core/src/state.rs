use chrono::{DateTime, Local, Utc};
use shared::{
    domain::{same_username, ConversationId, MessageKey},
    protocol::{parse_timestamp, ConversationSummary, MessagePayload, Profile},
};
use uuid::Uuid;

use crate::session::SessionPhase;

/// A message as rendered in a thread, server-confirmed or optimistic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub key: MessageKey,
    pub conversation_id: ConversationId,
    pub sender_username: String,
    pub text: String,
    pub created_at: String,
}

impl DisplayMessage {
    pub fn optimistic(
        conversation_id: ConversationId,
        sender_username: impl Into<String>,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: MessageKey::Local(format!("temp-{}", Uuid::new_v4())),
            conversation_id,
            sender_username: sender_username.into(),
            text: text.into(),
            created_at: now.to_rfc3339(),
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.key.is_local()
    }

    pub fn is_from(&self, username: &str) -> bool {
        same_username(&self.sender_username, username)
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }

    /// "You" for the signed-in user's own messages, the sender otherwise.
    pub fn sender_label<'a>(&'a self, me: Option<&str>) -> &'a str {
        match me {
            Some(me) if self.is_from(me) => "You",
            _ => &self.sender_username,
        }
    }

    /// Local wall-clock `HH:MM`, empty when the timestamp is unparseable.
    pub fn time_label(&self) -> String {
        self.sent_at()
            .map(|at| at.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

impl From<MessagePayload> for DisplayMessage {
    fn from(value: MessagePayload) -> Self {
        Self {
            key: MessageKey::Server(value.id),
            conversation_id: value.conversation_id,
            sender_username: value.sender_username,
            text: value.text,
            created_at: value.created_at,
        }
    }
}

/// Everything the client shows: session, conversation list, thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub phase: SessionPhase,
    pub token: Option<String>,
    pub profile: Option<Profile>,
    pub conversations: Vec<ConversationSummary>,
    pub selected: Option<ConversationId>,
    pub messages: Vec<DisplayMessage>,
    pub loading_conversations: bool,
    pub loading_messages: bool,
}

impl ChatSnapshot {
    pub fn username(&self) -> Option<&str> {
        self.profile.as_ref().map(|profile| profile.username.as_str())
    }

    pub fn selected_conversation(&self) -> Option<&ConversationSummary> {
        let selected = self.selected?;
        self.conversations.iter().find(|c| c.id == selected)
    }

    /// Drops every trace of the session.
    pub fn clear_session(&mut self) {
        *self = Self::default();
    }

    /// Replaces the list wholesale. Auto-selects the first entry only when
    /// nothing is selected; returns the id if that happened.
    pub fn replace_conversations(
        &mut self,
        conversations: Vec<ConversationSummary>,
    ) -> Option<ConversationId> {
        self.conversations = conversations;
        if self.selected.is_some() {
            return None;
        }
        let first = self.conversations.first()?.id;
        self.selected = Some(first);
        Some(first)
    }

    /// Adds a freshly started conversation at the front unless already
    /// listed, and selects it.
    pub fn adopt_started_conversation(&mut self, conversation: ConversationSummary) {
        let id = conversation.id;
        if !self.conversations.iter().any(|c| c.id == id) {
            self.conversations.insert(0, conversation);
        }
        self.selected = Some(id);
    }

    pub fn replace_messages(&mut self, messages: Vec<MessagePayload>) {
        self.messages = messages.into_iter().map(DisplayMessage::from).collect();
    }

    pub fn push_optimistic(&mut self, message: DisplayMessage) {
        self.messages.push(message);
    }
}
