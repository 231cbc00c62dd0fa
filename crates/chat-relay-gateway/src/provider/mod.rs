//! Upstream language-model providers.
//!
//! The gateway talks to the model through the [`ModelProvider`] trait so that
//! handlers can be exercised against a scripted provider in tests. Providers
//! return raw JSON; locating the reply text is the job of [`extract`].

pub mod extract;
pub mod gemini;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use chat_relay_core::WireMessage;

pub use gemini::GeminiProvider;

/// Raw JSON chunks of a streamed completion, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<Value, ProviderError>>;

/// Errors returned by an upstream provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key is configured.
    #[error("upstream credentials are not configured")]
    MissingCredentials,

    /// The provider rejected the credentials.
    #[error("upstream rejected the credentials: {0}")]
    Auth(String),

    /// The account's quota or rate limit is exhausted.
    #[error("upstream quota exceeded: {0}")]
    RateLimited(String),

    /// The provider answered with an error status.
    #[error("upstream error ({status}): {message}")]
    Api {
        /// HTTP status returned by the provider.
        status: u16,
        /// Error text returned by the provider.
        message: String,
    },

    /// The request could not be sent or the body could not be read.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The provider's response was not valid JSON.
    #[error("invalid upstream response: {0}")]
    Decode(String),
}

/// Trait for upstream model communication.
///
/// This trait abstracts the provider client interface, allowing for
/// mock implementations in tests.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Whether credentials are available. Checked before every request.
    fn is_configured(&self) -> bool;

    /// Request a complete reply for the conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the provider rejects it.
    async fn generate(&self, conversation: &[WireMessage]) -> Result<Value, ProviderError>;

    /// Request an incrementally delivered reply for the conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails before the stream starts.
    async fn stream(&self, conversation: &[WireMessage]) -> Result<ChunkStream, ProviderError>;
}
