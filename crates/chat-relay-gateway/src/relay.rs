//! Upstream call policy.
//!
//! Both reply modes retry the upstream exactly once when no text can be
//! extracted. The first attempt may legitimately produce an empty reply (a
//! blocked candidate, for example) so the retry costs a second billed call;
//! it is logged at warn level for that reason.

use futures::stream::{self, BoxStream};
use futures::StreamExt;

use chat_relay_core::WireMessage;

use crate::error::ApiError;
use crate::provider::extract::UPSTREAM_TEXT;
use crate::provider::{ChunkStream, ModelProvider, ProviderError};

/// Upstream calls per request: the first one plus one retry on an empty reply.
pub(crate) const MAX_ATTEMPTS: u32 = 2;

/// Non-empty reply text deltas, in arrival order.
pub type DeltaStream = BoxStream<'static, Result<String, ProviderError>>;

/// Fetch a whole reply.
///
/// # Errors
///
/// Returns [`ApiError::EmptyReply`] if both attempts yield no text, or the
/// mapped provider error if a call fails.
pub async fn complete_reply<P>(provider: &P, conversation: &[WireMessage]) -> Result<String, ApiError>
where
    P: ModelProvider + ?Sized,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let raw = provider.generate(conversation).await?;
        tracing::debug!(attempt, raw = %raw, "Upstream reply received");

        let text = UPSTREAM_TEXT.extract_or_empty(&raw);
        if !text.is_empty() {
            return Ok(text);
        }
        if attempt < MAX_ATTEMPTS {
            tracing::warn!(attempt, "Upstream reply had no text, retrying");
        }
    }

    tracing::error!(attempts = MAX_ATTEMPTS, "Upstream reply still empty, giving up");
    Err(ApiError::EmptyReply)
}

/// Open a streamed reply.
///
/// The stream is primed until its first non-empty delta so that an empty
/// reply or an early failure can still be reported with a status code.
///
/// # Errors
///
/// Returns [`ApiError::EmptyReply`] if both attempts end without text, or the
/// mapped provider error if a call fails before any text arrives.
pub async fn open_reply_stream<P>(
    provider: &P,
    conversation: &[WireMessage],
) -> Result<DeltaStream, ApiError>
where
    P: ModelProvider + ?Sized,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let mut deltas = text_deltas(provider.stream(conversation).await?);
        match deltas.next().await {
            Some(Ok(first)) => {
                return Ok(stream::once(async move { Ok(first) }).chain(deltas).boxed());
            }
            Some(Err(e)) => return Err(e.into()),
            None if attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, "Upstream stream had no text, retrying");
            }
            None => {}
        }
    }

    tracing::error!(attempts = MAX_ATTEMPTS, "Upstream stream still empty, giving up");
    Err(ApiError::EmptyReply)
}

fn text_deltas(chunks: ChunkStream) -> DeltaStream {
    chunks
        .filter_map(|chunk| async move {
            match chunk {
                Ok(value) => {
                    let text = UPSTREAM_TEXT.extract_or_empty(&value);
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
}
