//! Common error types for chat-relay.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors shared across the chat-relay crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A message carried a role other than user, assistant or system.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),
}
