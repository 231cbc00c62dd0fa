//! Core types and utilities for chat-relay.
//!
//! This crate provides the pieces shared by the gateway and the client:
//!
//! - **Messages**: transcript records, roles and the `{role, content}` wire form
//! - **Identifiers**: message IDs
//! - **SSE decoding**: incremental, UTF-8 safe frame decoding
//! - **Extraction**: ordered strategies for locating reply text in JSON
//!
//! # Example
//!
//! ```
//! use chat_relay_core::{Message, Role};
//!
//! let msg = Message::user("hello");
//! assert_eq!(msg.role, Role::User);
//! assert_eq!(msg.to_wire().content, "hello");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod extract;
pub mod ids;
pub mod message;
pub mod sse;

pub use error::{CoreError, Result};
pub use extract::{Extractor, Strategy};
pub use ids::{IdError, MessageId};
pub use message::{ChatReply, ChatRequest, ErrorReply, Message, Role, WireMessage};
