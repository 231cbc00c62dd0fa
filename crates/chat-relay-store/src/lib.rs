//! Storage layer for chat-relay.
//!
//! The client persists its transcript through the [`KeyValueStorage`]
//! capability, a synchronous get/set/remove interface injected at
//! composition time. Two implementations are provided:
//!
//! - [`FileStorage`]: one JSON file per key inside a directory
//! - [`MemoryStorage`]: a hash map, for tests and throwaway sessions
//!
//! [`TranscriptStore`] sits on top and keeps the conversation in sync with
//! storage on every change.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chat_relay_core::Message;
//! use chat_relay_store::{MemoryStorage, TranscriptStore};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let mut transcript = TranscriptStore::load(storage.clone());
//! transcript.push(Message::user("hello"));
//!
//! let restored = TranscriptStore::load(storage);
//! assert_eq!(restored.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod file;
pub mod memory;
pub mod transcript;

pub use error::{Result, StoreError};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use transcript::{TranscriptStore, DEFAULT_KEY};

/// Synchronous key-value storage capability.
///
/// This trait abstracts where the transcript lives, allowing for different
/// implementations (files on disk, in-memory for testing).
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be modified.
    fn remove(&self, key: &str) -> Result<()>;
}
