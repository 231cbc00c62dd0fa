//! Streaming chat client for the chat-relay gateway.
//!
//! [`ChatSession`] drives one conversation: it appends the user's message,
//! posts the whole transcript to the gateway and folds the streamed reply
//! into an assistant message as frames arrive. Exchanges can be stopped at
//! any point without corrupting the transcript.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_relay_client::{ChatSession, HttpChatClient, SignalBus};
//! use chat_relay_store::MemoryStorage;
//!
//! # async fn example() {
//! let transport = Arc::new(HttpChatClient::new("http://localhost:8080"));
//! let session = ChatSession::new(transport, Arc::new(MemoryStorage::new()), SignalBus::new());
//!
//! session.send("hello").await;
//! for message in session.transcript() {
//!     println!("{}: {}", message.role, message.content);
//! }
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assembler;
pub mod error;
pub mod http;
pub mod movies;
pub mod session;
pub mod signals;

pub use error::{ClientError, Result};
pub use http::{ChatResponse, ChatTransport, HttpChatClient};
pub use session::{ChatSession, RequestState, SendOutcome, SessionEvent};
pub use signals::{SignalBus, UiSignal};
