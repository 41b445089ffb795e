use shared::error::ApiError;
use thiserror::Error;

/// Failure of a single backend request.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Non-2xx response; the message is the backend `detail` or a status fallback.
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("network error: {0}")]
    Transport(String),
    #[error("invalid API base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("unexpected response payload: {0}")]
    Decode(String),
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(value: reqwest::Error) -> Self {
        let reason = if value.is_timeout() {
            "request timed out".to_string()
        } else if value.is_connect() {
            format!("failed to connect: {value}")
        } else {
            value.to_string()
        };
        RequestError::Transport(reason)
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(value: serde_json::Error) -> Self {
        RequestError::Decode(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),
    #[error("not signed in")]
    NotAuthenticated,
    #[error("no conversation selected")]
    NoConversationSelected,
    #[error("Login response did not include an access token")]
    MissingAccessToken,
    #[error(transparent)]
    Request(#[from] RequestError),
}

impl From<ApiError> for ClientError {
    fn from(value: ApiError) -> Self {
        ClientError::Request(RequestError::Api(value))
    }
}
