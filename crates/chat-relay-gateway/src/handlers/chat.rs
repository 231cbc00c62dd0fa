//! Chat relay endpoint.
//!
//! `POST /api/chat` takes `{messages: [{role, content}]}` and answers either
//! with an SSE stream of `{content}` frames closed by `[DONE]`, or with a
//! single `{content}` JSON body, depending on the configured reply mode.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, Stream};
use futures::StreamExt;
use serde_json::{json, Value};

use chat_relay_core::{sse, ChatReply, Role, WireMessage};

use crate::config::ReplyMode;
use crate::error::ApiError;
use crate::provider::ModelProvider;
use crate::relay::{self, DeltaStream};
use crate::state::GatewayState;

/// Relay a conversation to the model.
///
/// Credentials are checked before the body is looked at, so an
/// unconfigured gateway answers 500 to every request.
///
/// # Errors
///
/// - 400 for a malformed body
/// - 500 when the API key is missing or the upstream fails
/// - 401 or 429 when the upstream rejects the key or is out of quota
/// - 502 when the model returns no text after one retry
pub async fn chat<P>(
    State(state): State<Arc<GatewayState<P>>>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    P: ModelProvider + 'static,
{
    if !state.provider.is_configured() {
        tracing::error!("Chat request rejected: upstream API key is not configured");
        return Err(ApiError::NotConfigured);
    }

    let messages = parse_messages(&body)?;
    tracing::info!(
        messages = messages.len(),
        mode = ?state.config.reply_mode,
        "Relaying chat request"
    );

    match state.config.reply_mode {
        ReplyMode::Json => {
            let content = relay::complete_reply(state.provider.as_ref(), &messages).await?;
            Ok(Json(ChatReply { content }).into_response())
        }
        ReplyMode::Stream => {
            let deltas = relay::open_reply_stream(state.provider.as_ref(), &messages).await?;
            Ok(Sse::new(reply_events(deltas)).into_response())
        }
    }
}

/// Validate the request body and return its messages.
fn parse_messages(body: &[u8]) -> Result<Vec<WireMessage>, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ApiError::BadRequest("Request body must be a JSON object.".to_string()))?;

    let raw = value
        .get("messages")
        .and_then(Value::as_array)
        .filter(|messages| !messages.is_empty())
        .ok_or_else(|| ApiError::BadRequest("A non-empty messages array is required.".to_string()))?;

    let messages: Vec<WireMessage> = raw
        .iter()
        .enumerate()
        .map(|(index, message)| {
            serde_json::from_value(message.clone()).map_err(|e| {
                ApiError::BadRequest(format!("Message {index} is invalid: {e}"))
            })
        })
        .collect::<Result<_, _>>()?;

    match messages.last() {
        Some(last) if last.role == Role::User && !last.content.trim().is_empty() => Ok(messages),
        _ => Err(ApiError::BadRequest(
            "The last message must have role \"user\" and non-empty content.".to_string(),
        )),
    }
}

/// Turn text deltas into SSE events.
///
/// A clean end is marked with `[DONE]`. A failure produces one `{error}`
/// event and closes the stream without the sentinel.
fn reply_events(deltas: DeltaStream) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(Some(deltas), |state| async move {
        let mut deltas = state?;
        let (event, next) = match deltas.next().await {
            Some(Ok(text)) => (data_event(&json!({ "content": text })), Some(deltas)),
            Some(Err(e)) => {
                tracing::error!(error = %e, "Upstream stream failed mid-reply");
                let message = ApiError::from(e).to_string();
                (data_event(&json!({ "error": message })), None)
            }
            None => {
                tracing::debug!("Upstream stream finished");
                (Event::default().data(sse::DONE), None)
            }
        };
        Some((Ok(event), next))
    })
}

fn data_event(payload: &Value) -> Event {
    Event::default().data(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chat_relay_core::sse::FrameDecoder;

    use crate::config::GatewayConfig;
    use crate::provider::testing::{gemini_chunk, Reply, ScriptedProvider};
    use crate::provider::ProviderError;
    use crate::routes::create_router;

    fn server(provider: &Arc<ScriptedProvider>, mode: ReplyMode) -> TestServer {
        let config = GatewayConfig {
            reply_mode: mode,
            ..GatewayConfig::default()
        };
        let state = GatewayState::new(Arc::clone(provider), config);
        TestServer::new(create_router(state)).unwrap()
    }

    fn hello() -> Value {
        json!({"messages": [{"role": "user", "content": "hello"}]})
    }

    fn payloads(body: &str) -> Vec<String> {
        FrameDecoder::new().push(body.as_bytes())
    }

    fn error_of(response: &axum_test::TestResponse) -> String {
        let body: Value = response.json();
        body["error"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn validation_rules() {
        assert!(parse_messages(b"not json").is_err());
        assert!(parse_messages(br#"{"messages": []}"#).is_err());
        assert!(parse_messages(br#"{"other": 1}"#).is_err());
        assert!(parse_messages(br#"{"messages": [{"role": "assistant", "content": "hi"}]}"#).is_err());
        assert!(parse_messages(br#"{"messages": [{"role": "user", "content": "  "}]}"#).is_err());
        assert!(parse_messages(br#"{"messages": [{"role": "user"}]}"#).is_err());
        assert!(parse_messages(
            br#"{"messages": [{"role": "model", "content": "x"}, {"role": "user", "content": "hi"}]}"#
        )
        .is_err());

        let ok = parse_messages(
            br#"{"messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "hi", "id": "user-1"}]}"#,
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
    }

    #[tokio::test]
    async fn malformed_requests_get_400() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let server = server(&provider, ReplyMode::Stream);

        let response = server.post("/api/chat").text("{oops").await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = server.post("/api/chat").json(&json!({"messages": []})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(error_of(&response).contains("messages"));

        let response = server
            .post("/api/chat")
            .json(&json!({"messages": [{"role": "assistant", "content": "hi"}]}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn missing_credentials_win_over_validation() {
        let provider = Arc::new(ScriptedProvider::unconfigured());
        let server = server(&provider, ReplyMode::Stream);

        let response = server.post("/api/chat").text("{oops").await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error_of(&response).contains("GOOGLE_GEMINI_API_KEY"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn streams_deltas_then_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::Chunks(vec![
            Ok(gemini_chunk("Hi")),
            Ok(gemini_chunk(" there")),
        ])]));
        let server = server(&provider, ReplyMode::Stream);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status_ok();
        let content_type = response.header("content-type");
        assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));

        assert_eq!(
            payloads(&response.text()),
            vec![
                r#"{"content":"Hi"}"#.to_string(),
                r#"{"content":" there"}"#.to_string(),
                "[DONE]".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_sends_one_error_frame() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::Chunks(vec![
            Ok(gemini_chunk("partial")),
            Err(ProviderError::Transport("connection reset".into())),
            Ok(gemini_chunk("never sent")),
        ])]));
        let server = server(&provider, ReplyMode::Stream);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status_ok();

        let frames = payloads(&response.text());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], r#"{"content":"partial"}"#);
        let error: Value = serde_json::from_str(&frames[1]).unwrap();
        assert!(error["error"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn empty_stream_twice_is_502() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Reply::Chunks(vec![Ok(gemini_chunk(""))]),
            Reply::Chunks(vec![]),
        ]));
        let server = server(&provider, ReplyMode::Stream);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_429() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::Fail(
            ProviderError::RateLimited("Resource has been exhausted".into()),
        )]));
        let server = server(&provider, ReplyMode::Stream);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        assert!(error_of(&response).starts_with("Quota exceeded"));
    }

    #[tokio::test]
    async fn rejected_key_is_401() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::Fail(ProviderError::Auth(
            "API key not valid".into(),
        ))]));
        let server = server(&provider, ReplyMode::Json);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn json_mode_returns_whole_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::Whole(gemini_chunk(
            "Hi there",
        ))]));
        let server = server(&provider, ReplyMode::Json);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status_ok();
        response.assert_json(&json!({"content": "Hi there"}));
    }

    #[tokio::test]
    async fn json_mode_empty_twice_is_502() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Reply::Whole(json!({"candidates": []})),
            Reply::Whole(json!({"candidates": []})),
        ]));
        let server = server(&provider, ReplyMode::Json);

        let response = server.post("/api/chat").json(&hello()).await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn full_history_is_forwarded() {
        let provider = Arc::new(ScriptedProvider::new(vec![Reply::Whole(gemini_chunk("4"))]));
        let server = server(&provider, ReplyMode::Json);

        let response = server
            .post("/api/chat")
            .json(&json!({"messages": [
                {"role": "user", "content": "2+2?", "id": "user-1", "timestamp": 1},
                {"role": "assistant", "content": "Let me think."},
                {"role": "user", "content": "Just the number."}
            ]}))
            .await;
        response.assert_status_ok();

        assert_eq!(
            provider.last_conversation(),
            vec![
                WireMessage::new(Role::User, "2+2?"),
                WireMessage::new(Role::Assistant, "Let me think."),
                WireMessage::new(Role::User, "Just the number."),
            ]
        );
    }
}
