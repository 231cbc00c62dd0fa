//! HTTP gateway between chat clients and the upstream language model.
//!
//! The gateway exposes a single chat route. It validates the conversation,
//! forwards it to Google Gemini and relays the reply, either streamed as
//! server-sent events or as one JSON body.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   POST /api/chat    ┌─────────────────────┐
//! │  relay-chat  │ ──────────────────▶ │ chat-relay-gateway  │
//! │   (client)   │ ◀── SSE or JSON ─── │  Router + Handlers  │
//! └──────────────┘                     └─────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                       ┌───────────────────┐
//!                                       │  ModelProvider    │
//!                                       │  (Gemini REST)    │
//!                                       └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_relay_gateway::{create_router, GatewayConfig, GatewayState, GeminiProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_env();
//! let provider = Arc::new(GeminiProvider::new(config.upstream.clone())?);
//! let listen_addr = config.listen_addr.clone();
//!
//! let app = create_router(GatewayState::new(provider, config));
//!
//! let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod provider;
pub mod relay;
pub mod routes;
pub mod state;

pub use config::{GatewayConfig, ReplyMode, UpstreamConfig};
pub use error::ApiError;
pub use provider::{GeminiProvider, ModelProvider, ProviderError};
pub use routes::create_router;
pub use state::GatewayState;
