//! Backend commands queued from UI to backend worker.

use client_core::AuthMode;
use shared::domain::ConversationId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    CheckHealth,
    RestoreSession,
    Authenticate {
        mode: AuthMode,
        username: String,
        password: String,
    },
    Logout,
    StartChat {
        username: String,
    },
    SelectConversation {
        conversation_id: ConversationId,
    },
    SendMessage {
        text: String,
    },
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::CheckHealth => "check_health",
            BackendCommand::RestoreSession => "restore_session",
            BackendCommand::Authenticate { .. } => "authenticate",
            BackendCommand::Logout => "logout",
            BackendCommand::StartChat { .. } => "start_chat",
            BackendCommand::SelectConversation { .. } => "select_conversation",
            BackendCommand::SendMessage { .. } => "send_message",
        }
    }
}
