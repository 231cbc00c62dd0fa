//! Folding of decoded frame payloads into assistant text.
//!
//! The assembler only classifies payloads; applying text to the transcript
//! is left to the session, which owns the cancellation checks.

use serde_json::Value;

use chat_relay_core::sse::DONE;

use crate::error::{ClientError, Result};

/// What to do with one frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameAction {
    /// Append this text to the open assistant message. May be empty.
    Append(String),
    /// The reply is complete; stop reading.
    Finish,
    /// Nothing to apply.
    Skip,
}

/// Per-exchange stream state.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    applied: usize,
    skipped: usize,
    finished: bool,
}

impl StreamAssembler {
    /// Create an assembler for a new exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the next payload.
    ///
    /// Once the sentinel has been seen every later payload yields
    /// [`FrameAction::Finish`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] for a payload carrying an `error` field
    /// that is not `null`, `false`, `0` or `""`.
    pub fn step(&mut self, payload: &str) -> Result<FrameAction> {
        if self.finished {
            return Ok(FrameAction::Finish);
        }
        if payload.trim() == DONE {
            self.finished = true;
            return Ok(FrameAction::Finish);
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, payload = %payload, "Skipping malformed frame");
                self.skipped += 1;
                return Ok(FrameAction::Skip);
            }
        };

        match value.get("error") {
            Some(error) if is_set(error) => {
                self.finished = true;
                let message = error
                    .as_str()
                    .map_or_else(|| error.to_string(), str::to_string);
                return Err(ClientError::Remote(message));
            }
            _ => {}
        }

        if let Some(text) = value.get("content").and_then(Value::as_str) {
            self.applied += 1;
            return Ok(FrameAction::Append(text.to_string()));
        }

        tracing::warn!(payload = %payload, "Skipping frame without content");
        self.skipped += 1;
        Ok(FrameAction::Skip)
    }

    /// Number of content payloads returned for appending.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Number of payloads that were skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Whether the sentinel or an error frame has been seen.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Whether an `error` field actually reports an error.
fn is_set(error: &Value) -> bool {
    match error {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}
