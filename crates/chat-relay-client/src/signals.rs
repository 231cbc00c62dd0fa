//! In-process UI signals.
//!
//! The session publishes on a [`SignalBus`] handed to it at construction;
//! front ends subscribe to react.

use tokio::sync::broadcast;

const CAPACITY: usize = 16;

const NAME_TOKENS: &[&str] = &["james cameron", "제임스 카메론", "제임스카메론"];

const INTENT_TOKENS: &[&str] = &[
    "movie",
    "film",
    "list",
    "show",
    "recommend",
    "영화",
    "작품",
    "리스트",
    "보여줘",
    "추천",
];

/// A request for the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiSignal {
    /// Show the movie panel.
    OpenMoviePanel,
}

/// Publish/subscribe channel for [`UiSignal`]s.
#[derive(Debug, Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<UiSignal>,
}

impl SignalBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Subscribe to signals published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiSignal> {
        self.sender.subscribe()
    }

    /// Publish a signal. Returns how many subscribers received it.
    pub fn publish(&self, signal: UiSignal) -> usize {
        let receivers = self.sender.send(signal).unwrap_or(0);
        tracing::debug!(?signal, receivers, "UI signal published");
        receivers
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Check user text for a request the front end should act on.
///
/// The movie panel needs a name token and an intent token, both matched
/// case-insensitively anywhere in the text.
#[must_use]
pub fn detect(text: &str) -> Option<UiSignal> {
    let lower = text.to_lowercase();
    let has_name = NAME_TOKENS.iter().any(|token| lower.contains(token));
    let has_intent = INTENT_TOKENS.iter().any(|token| lower.contains(token));
    (has_name && has_intent).then_some(UiSignal::OpenMoviePanel)
}
