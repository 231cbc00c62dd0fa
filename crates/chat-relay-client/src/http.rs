//! HTTP transport for the gateway chat route.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;

use chat_relay_core::extract::{non_empty_str_field, REPLY_FIELDS};
use chat_relay_core::{ChatRequest, WireMessage};

use crate::error::{ClientError, Result};

/// Raw body chunks of a streamed reply.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// A successful reply from the chat route.
pub enum ChatResponse {
    /// The whole reply text, from a JSON body.
    Complete(String),
    /// An SSE body still being received.
    Stream(ByteStream),
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Trait for sending a conversation to the chat route.
///
/// Dropping the returned future, or the stream inside a [`ChatResponse`],
/// abandons the request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the conversation and wait for the response headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the gateway answers with an
    /// error status.
    async fn send(&self, messages: &[WireMessage]) -> Result<ChatResponse>;
}

/// Client for the gateway's `POST /api/chat` route.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    client: Client,
    base_url: String,
}

impl HttpChatClient {
    /// Create a new chat client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the gateway (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let body = response.text().await.ok();
        ClientError::Api {
            status,
            message: error_text(status, body.as_deref()),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn send(&self, messages: &[WireMessage]) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let request = ChatRequest {
            messages: messages.to_vec(),
        };

        tracing::debug!(url = %url, messages = messages.len(), "Sending chat request");
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));

        if is_json {
            let body: Value = response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()))?;
            return Ok(ChatResponse::Complete(REPLY_FIELDS.extract_or_empty(&body)));
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from));
        Ok(ChatResponse::Stream(chunks.boxed()))
    }
}

/// Pick the message to show for an error response.
///
/// Order: the JSON `error` field, the raw body when it is not JSON, a
/// status-specific text for 401/429/500, then a generic line.
#[must_use]
pub fn error_text(status: u16, body: Option<&str>) -> String {
    let body = body.map(str::trim).filter(|text| !text.is_empty());

    if let Some(text) = body {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                if let Some(error) = non_empty_str_field(&value, "error") {
                    return error;
                }
            }
            Err(_) => return text.to_string(),
        }
    }

    match status {
        401 => "Authentication failed: check the API key.".to_string(),
        429 => "Quota exceeded: the API usage limit was reached. Try again later.".to_string(),
        500 => "The server hit an error. Try again later.".to_string(),
        _ => format!("HTTP error! status: {status}"),
    }
}
