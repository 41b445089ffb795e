//! HTTP client wrapper for the messaging backend.
//!
//! Every call goes through [`HttpApi::request_json`]: JSON in, JSON out,
//! bearer credential attached when present, and every non-2xx response
//! folded into a single [`RequestError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use shared::{
    domain::ConversationId,
    error::ApiError,
    protocol::{
        ConversationSummary, CreateConversationRequest, Credentials, HealthResponse,
        MessagePayload, Profile, SendMessageRequest, TokenResponse,
    },
};
use tracing::debug;

use crate::{config::normalize_api_base, error::RequestError};

/// Backend operations used by the session and the pollers.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn health(&self) -> Result<HealthResponse, RequestError>;
    async fn register(&self, credentials: &Credentials) -> Result<Profile, RequestError>;
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, RequestError>;
    async fn me(&self, token: &str) -> Result<Profile, RequestError>;
    async fn list_conversations(
        &self,
        token: &str,
    ) -> Result<Vec<ConversationSummary>, RequestError>;
    async fn create_conversation(
        &self,
        token: &str,
        username: &str,
    ) -> Result<ConversationSummary, RequestError>;
    async fn list_messages(
        &self,
        token: &str,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessagePayload>, RequestError>;
    /// Returns the created message when the backend echoes one back.
    async fn send_message(
        &self,
        token: &str,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Option<MessagePayload>, RequestError>;
}

pub struct HttpApi {
    http: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RequestError> {
        let base_url = normalize_api_base(base_url)?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Issues one request and returns the parsed body.
    ///
    /// Empty or non-JSON bodies become `{}`, on success and failure alike.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value, RequestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), url.as_str())
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let data = lenient_json(&bytes);
        debug!(%method, path, status = status.as_u16(), "api request finished");

        if !status.is_success() {
            return Err(ApiError::from_body(status.as_u16(), &data).into());
        }
        Ok(data)
    }

    async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        let data = self.request_json(method, path, token, body.as_ref()).await?;
        Ok(serde_json::from_value(data)?)
    }
}

/// Parses a response body, degrading to an empty object.
pub fn lenient_json(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn messages_path(conversation_id: ConversationId) -> String {
    format!("/conversations/{}/messages", conversation_id.0)
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn health(&self) -> Result<HealthResponse, RequestError> {
        self.call::<(), _>(Method::GET, "/health", None, None).await
    }

    async fn register(&self, credentials: &Credentials) -> Result<Profile, RequestError> {
        self.call(Method::POST, "/auth/register", None, Some(credentials))
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, RequestError> {
        self.call(Method::POST, "/auth/login", None, Some(credentials))
            .await
    }

    async fn me(&self, token: &str) -> Result<Profile, RequestError> {
        self.call::<(), _>(Method::GET, "/auth/me", Some(token), None)
            .await
    }

    async fn list_conversations(
        &self,
        token: &str,
    ) -> Result<Vec<ConversationSummary>, RequestError> {
        self.call::<(), _>(Method::GET, "/conversations", Some(token), None)
            .await
    }

    async fn create_conversation(
        &self,
        token: &str,
        username: &str,
    ) -> Result<ConversationSummary, RequestError> {
        let body = CreateConversationRequest {
            username: username.to_string(),
        };
        self.call(Method::POST, "/conversations", Some(token), Some(&body))
            .await
    }

    async fn list_messages(
        &self,
        token: &str,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessagePayload>, RequestError> {
        self.call::<(), _>(
            Method::GET,
            &messages_path(conversation_id),
            Some(token),
            None,
        )
        .await
    }

    async fn send_message(
        &self,
        token: &str,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<Option<MessagePayload>, RequestError> {
        let body = serde_json::to_value(SendMessageRequest {
            text: text.to_string(),
        })?;
        let data = self
            .request_json(
                Method::POST,
                &messages_path(conversation_id),
                Some(token),
                Some(&body),
            )
            .await?;
        Ok(serde_json::from_value(data).ok())
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
