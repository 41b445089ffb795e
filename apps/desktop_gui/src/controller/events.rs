//! UI/backend events and error modeling for desktop GUI controller.

use client_core::{
    ClientError, ClientEvent, DisplayMessage, LoadingTarget, MessagesUpdateReason, RequestError,
    SessionPhase,
};
use shared::{
    domain::ConversationId,
    protocol::{ConversationSummary, Profile},
};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Info(String),
    BackendHealth(Result<String, String>),
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
    AuthFinished,
    ChatStarted(ConversationSummary),
    Error(UiError),
}

impl From<ClientEvent> for UiEvent {
    fn from(value: ClientEvent) -> Self {
        match value {
            ClientEvent::SessionChanged { phase, profile } => {
                UiEvent::SessionChanged { phase, profile }
            }
            ClientEvent::ConversationsUpdated {
                conversations,
                selected,
            } => UiEvent::ConversationsUpdated {
                conversations,
                selected,
            },
            ClientEvent::SelectionChanged(selected) => UiEvent::SelectionChanged(selected),
            ClientEvent::MessagesUpdated {
                conversation_id,
                messages,
                reason,
            } => UiEvent::MessagesUpdated {
                conversation_id,
                messages,
                reason,
            },
            ClientEvent::LoadingChanged { target, loading } => {
                UiEvent::LoadingChanged { target, loading }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

/// Where an error is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Auth,
    StartChat,
    SendMessage,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn new(
        context: UiErrorContext,
        category: UiErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            context,
            message: message.into(),
        }
    }

    pub fn from_client_error(context: UiErrorContext, err: &ClientError) -> Self {
        let category = match err {
            ClientError::Validation(_) | ClientError::NoConversationSelected => {
                UiErrorCategory::Validation
            }
            ClientError::NotAuthenticated | ClientError::MissingAccessToken => {
                UiErrorCategory::Auth
            }
            ClientError::Request(RequestError::Api(api)) if matches!(api.status, 401 | 403) => {
                UiErrorCategory::Auth
            }
            ClientError::Request(RequestError::Api(api)) if matches!(api.status, 400 | 409 | 422) => {
                UiErrorCategory::Validation
            }
            ClientError::Request(RequestError::Transport(_))
            | ClientError::Request(RequestError::InvalidBaseUrl { .. }) => {
                UiErrorCategory::Transport
            }
            _ => UiErrorCategory::Unknown,
        };
        Self::new(context, category, err.to_string())
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth && self.context != UiErrorContext::Auth
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
