use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ConversationId);
id_newtype!(MessageId);

/// Identity of a message in a rendered thread.
///
/// Server messages carry the backend id; optimistic messages carry a
/// client-generated `temp-…` tag until the next poll replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageKey {
    Server(MessageId),
    Local(String),
}

impl MessageKey {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageKey::Local(_))
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Server(id) => write!(f, "{id}"),
            MessageKey::Local(tag) => f.write_str(tag),
        }
    }
}

/// Usernames are compared case-insensitively everywhere a client decides
/// whether a message is "mine".
pub fn same_username(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
