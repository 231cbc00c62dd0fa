//! The persisted conversation transcript.
//!
//! Every mutation rewrites the whole transcript under a single key. Storage
//! failures are logged and swallowed: losing persistence must never break the
//! conversation in progress.

use std::sync::Arc;

use chat_relay_core::{Message, MessageId, Role, WireMessage};

use crate::error::StoreError;
use crate::KeyValueStorage;

/// Key under which the transcript is stored.
pub const DEFAULT_KEY: &str = "chat-history";

/// Ordered conversation history with write-through persistence.
pub struct TranscriptStore {
    messages: Vec<Message>,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl TranscriptStore {
    /// Restore the transcript saved under [`DEFAULT_KEY`].
    #[must_use]
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::load_with_key(storage, DEFAULT_KEY)
    }

    /// Restore the transcript saved under `key`.
    ///
    /// A missing or unreadable value yields an empty transcript.
    #[must_use]
    pub fn load_with_key(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let messages = match storage.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to parse saved transcript");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to load saved transcript");
                Vec::new()
            }
        };

        tracing::debug!(key = %key, count = messages.len(), "Transcript restored");
        Self {
            messages,
            storage,
            key,
        }
    }

    /// All messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The transcript reduced to `{role, content}` pairs.
    #[must_use]
    pub fn wire_messages(&self) -> Vec<WireMessage> {
        self.messages.iter().map(Message::to_wire).collect()
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.persist();
    }

    /// Append a fragment to the open assistant message.
    ///
    /// Returns `false` (and changes nothing) unless the last message is the
    /// assistant message identified by `id`.
    pub fn append_to_last(&mut self, id: &MessageId, fragment: &str) -> bool {
        let Some(last) = self.messages.last_mut() else {
            return false;
        };
        if last.role != Role::Assistant || last.id.as_ref() != Some(id) {
            return false;
        }
        if fragment.is_empty() {
            return true;
        }
        last.content.push_str(fragment);
        self.persist();
        true
    }

    /// Drop every message after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        if len < self.messages.len() {
            self.messages.truncate(len);
            self.persist();
        }
    }

    /// Remove every message and the persisted copy.
    pub fn clear(&mut self) {
        self.messages.clear();
        if let Err(e) = self.storage.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "Failed to clear saved transcript");
        }
    }

    fn persist(&self) {
        let result = serde_json::to_string(&self.messages)
            .map_err(|e| StoreError::Serialization(e.to_string()))
            .and_then(|raw| self.storage.set(&self.key, &raw));
        if let Err(e) = result {
            tracing::warn!(key = %self.key, error = %e, "Failed to save transcript");
        }
    }
}

impl std::fmt::Debug for TranscriptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptStore")
            .field("key", &self.key)
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}
