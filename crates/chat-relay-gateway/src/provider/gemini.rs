//! Google Gemini provider.
//!
//! Speaks the `v1beta` REST API: `generateContent` for whole replies and
//! `streamGenerateContent?alt=sse` for streamed ones.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::{json, Value};

use chat_relay_core::{sse, Role, WireMessage};

use super::{ChunkStream, ModelProvider, ProviderError};
use crate::config::UpstreamConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini REST client.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    config: UpstreamConfig,
}

impl GeminiProvider {
    /// Create a provider for the given upstream settings.
    ///
    /// The configured timeout bounds a whole `generateContent` call. A
    /// streamed reply may run longer, as long as no single read stalls for
    /// longer than the timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: UpstreamConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{method}",
            self.config.base_url, self.config.model
        )
    }

    async fn post(
        &self,
        url: &str,
        conversation: &[WireMessage],
        deadline: Option<Duration>,
    ) -> Result<Response, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials)?;

        tracing::debug!(
            url = %url,
            model = %self.config.model,
            messages = conversation.len(),
            "Calling upstream model"
        );

        let mut request = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&request_body(conversation));
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %truncate(&body, 500),
            "Upstream model returned an error"
        );
        Err(classify(status.as_u16(), error_message(&body, status.as_u16())))
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn generate(&self, conversation: &[WireMessage]) -> Result<Value, ProviderError> {
        let response = self
            .post(
                &self.endpoint("generateContent"),
                conversation,
                Some(self.config.timeout()),
            )
            .await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn stream(&self, conversation: &[WireMessage]) -> Result<ChunkStream, ProviderError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(&url, conversation, None).await?;

        let bytes = Box::pin(response.bytes_stream());
        let chunks = sse::frames(bytes).filter_map(|frame| async move {
            match frame {
                Err(e) => Some(Err(ProviderError::Transport(e.to_string()))),
                Ok(payload) if payload.trim() == sse::DONE => None,
                Ok(payload) => match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => Some(chunk_result(value)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed upstream frame");
                        None
                    }
                },
            }
        });

        Ok(chunks.boxed())
    }
}

/// Build a `generateContent` request body from the conversation.
///
/// Assistant turns become `model` turns and system turns are gathered into
/// `systemInstruction`. Blank messages are dropped since the API rejects
/// empty parts.
#[must_use]
pub fn request_body(conversation: &[WireMessage]) -> Value {
    let mut contents = Vec::new();
    let mut system = Vec::new();

    for message in conversation {
        if message.content.trim().is_empty() {
            continue;
        }
        let part = json!({ "text": message.content });
        match message.role {
            Role::System => system.push(part),
            Role::User => contents.push(json!({ "role": "user", "parts": [part] })),
            Role::Assistant => contents.push(json!({ "role": "model", "parts": [part] })),
        }
    }

    let mut body = json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": system });
    }
    body
}

/// A streamed chunk may itself carry an `{error: {...}}` object.
fn chunk_result(value: Value) -> Result<Value, ProviderError> {
    let Some(error) = value.get("error") else {
        return Ok(value);
    };
    let status = error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(500);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| error.to_string(), str::to_string);
    Err(classify(status, message))
}

fn classify(status: u16, message: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimited(message),
        _ => ProviderError::Api { status, message },
    }
}

/// Pull the human-readable message out of a Google error body.
fn error_message(body: &str, status: u16) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
    });

    from_json
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| truncate(trimmed, 200).to_string())
        })
        .unwrap_or_else(|| format!("upstream returned status {status}"))
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
