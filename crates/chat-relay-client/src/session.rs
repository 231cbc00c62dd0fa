//! Request orchestration for one chat conversation.
//!
//! A [`ChatSession`] owns the transcript and the request state. At most one
//! exchange is in flight; it can be stopped at any suspension point, and a
//! stopped exchange never writes to the transcript again.
//!
//! State is kept behind a mutex that is only taken between awaits. Every
//! transcript write re-checks the exchange's cancellation token and
//! generation under that lock, so `stop` and `new_chat` take effect
//! atomically with respect to incoming fragments.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use chat_relay_core::{sse, Message, MessageId, Role, WireMessage};
use chat_relay_store::{KeyValueStorage, TranscriptStore};

use crate::assembler::{FrameAction, StreamAssembler};
use crate::error::ClientError;
use crate::http::{ByteStream, ChatResponse, ChatTransport};
use crate::signals::{self, SignalBus};

const EVENT_CAPACITY: usize = 256;

/// UI-facing request state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    /// An exchange is in flight.
    pub is_loading: bool,
    /// Message of the last failed exchange.
    pub error: Option<String>,
}

/// Progress notifications for front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message was added to the transcript.
    MessageAppended(Message),
    /// Text was appended to the open assistant message.
    Delta {
        /// The assistant message being filled.
        id: MessageId,
        /// The appended fragment.
        text: String,
    },
    /// The exchange finished normally.
    Completed,
    /// The exchange was stopped.
    Cancelled,
    /// The exchange failed and the transcript was rolled back.
    Failed {
        /// Error message.
        message: String,
        /// Contextual help, for quota errors.
        help: Option<&'static str>,
    },
    /// The conversation was cleared.
    Cleared,
}

/// How a call to [`ChatSession::send`] ended.
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing was sent: the text was blank or an exchange is in flight.
    Ignored,
    /// The reply was received in full.
    Completed,
    /// The exchange was stopped; partial content was kept.
    Cancelled,
    /// The exchange failed.
    Failed(ClientError),
}

enum ExchangeEnd {
    Completed,
    Cancelled,
}

struct Exchange {
    token: CancellationToken,
    generation: u64,
    rollback_len: usize,
}

struct Inner {
    transcript: TranscriptStore,
    state: RequestState,
    cancel: Option<CancellationToken>,
    generation: u64,
}

/// A chat conversation bound to a transport and a storage backend.
pub struct ChatSession<T>
where
    T: ChatTransport,
{
    transport: Arc<T>,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SessionEvent>,
    signals: SignalBus,
}

impl<T> ChatSession<T>
where
    T: ChatTransport,
{
    /// Create a session, restoring any transcript saved in `storage`.
    #[must_use]
    pub fn new(transport: Arc<T>, storage: Arc<dyn KeyValueStorage>, signals: SignalBus) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            transcript: TranscriptStore::load(storage),
            state: RequestState::default(),
            cancel: None,
            generation: 0,
        };
        Self {
            transport,
            inner: Arc::new(Mutex::new(inner)),
            events,
            signals,
        }
    }

    /// Subscribe to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The signal bus this session publishes on.
    #[must_use]
    pub fn signals(&self) -> &SignalBus {
        &self.signals
    }

    /// A snapshot of the transcript.
    #[must_use]
    pub fn transcript(&self) -> Vec<Message> {
        self.inner.lock().transcript.messages().to_vec()
    }

    /// A snapshot of the request state.
    #[must_use]
    pub fn request_state(&self) -> RequestState {
        self.inner.lock().state.clone()
    }

    /// Clear the error of the last failed exchange.
    pub fn dismiss_error(&self) {
        self.inner.lock().state.error = None;
    }

    /// Send a user message and receive the reply.
    ///
    /// Returns [`SendOutcome::Ignored`] for blank text or while another
    /// exchange is in flight. On failure the transcript is restored to what
    /// it was before the call and the error is kept in the request state.
    pub async fn send(&self, content: &str) -> SendOutcome {
        let content = content.trim();
        if content.is_empty() {
            return SendOutcome::Ignored;
        }
        let Some((exchange, conversation)) = self.begin(content) else {
            return SendOutcome::Ignored;
        };

        let result = self.run(&exchange, &conversation).await;
        self.finish(&exchange, result)
    }

    /// Stop the in-flight exchange. Returns `false` if there was none.
    pub fn stop(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some(token) = inner.cancel.take() else {
            return false;
        };
        token.cancel();
        inner.state.is_loading = false;
        tracing::debug!(generation = inner.generation, "Exchange stopped");
        true
    }

    /// Start over: stop any exchange and drop the transcript and its saved copy.
    pub fn new_chat(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        inner.generation += 1;
        inner.transcript.clear();
        inner.state = RequestState::default();
        self.emit(SessionEvent::Cleared);
        tracing::debug!("Conversation cleared");
    }

    fn begin(&self, content: &str) -> Option<(Exchange, Vec<WireMessage>)> {
        let mut inner = self.inner.lock();
        if inner.state.is_loading {
            tracing::debug!("Send ignored while an exchange is in flight");
            return None;
        }

        if let Some(signal) = signals::detect(content) {
            self.signals.publish(signal);
        }

        let rollback_len = inner.transcript.len();
        let message = Message::user(content);
        inner.transcript.push(message.clone());
        self.emit(SessionEvent::MessageAppended(message));

        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());
        inner.state = RequestState {
            is_loading: true,
            error: None,
        };
        inner.generation += 1;

        let exchange = Exchange {
            token,
            generation: inner.generation,
            rollback_len,
        };
        Some((exchange, inner.transcript.wire_messages()))
    }

    async fn run(
        &self,
        exchange: &Exchange,
        conversation: &[WireMessage],
    ) -> Result<ExchangeEnd, ClientError> {
        let response = tokio::select! {
            biased;
            () = exchange.token.cancelled() => return Ok(ExchangeEnd::Cancelled),
            response = self.transport.send(conversation) => response?,
        };

        match response {
            ChatResponse::Complete(text) => {
                let message = Message::assistant(text);
                let applied = self.apply(exchange, |inner| {
                    inner.transcript.push(message.clone());
                    self.emit(SessionEvent::MessageAppended(message));
                });
                Ok(applied.map_or(ExchangeEnd::Cancelled, |()| ExchangeEnd::Completed))
            }
            ChatResponse::Stream(body) => self.assemble(exchange, body).await,
        }
    }

    async fn assemble(
        &self,
        exchange: &Exchange,
        body: ByteStream,
    ) -> Result<ExchangeEnd, ClientError> {
        let id = MessageId::generate(Role::Assistant);
        let message = Message {
            id: Some(id.clone()),
            ..Message::assistant("")
        };
        let opened = self.apply(exchange, |inner| {
            inner.transcript.push(message.clone());
            self.emit(SessionEvent::MessageAppended(message));
        });
        if opened.is_none() {
            return Ok(ExchangeEnd::Cancelled);
        }

        let mut frames = std::pin::pin!(sse::frames(body));
        let mut assembler = StreamAssembler::new();

        loop {
            let frame = tokio::select! {
                biased;
                () = exchange.token.cancelled() => return Ok(ExchangeEnd::Cancelled),
                frame = frames.next() => frame,
            };
            let Some(frame) = frame else {
                break;
            };

            match assembler.step(&frame?)? {
                FrameAction::Append(text) => {
                    let applied = self.apply(exchange, |inner| {
                        if inner.transcript.append_to_last(&id, &text) && !text.is_empty() {
                            self.emit(SessionEvent::Delta {
                                id: id.clone(),
                                text: text.clone(),
                            });
                        }
                    });
                    if applied.is_none() {
                        return Ok(ExchangeEnd::Cancelled);
                    }
                }
                FrameAction::Finish => break,
                FrameAction::Skip => {}
            }
        }

        tracing::debug!(
            applied = assembler.applied(),
            skipped = assembler.skipped(),
            "Reply stream finished"
        );
        Ok(ExchangeEnd::Completed)
    }

    /// Run `f` under the lock unless the exchange has been stopped or superseded.
    fn apply<R>(&self, exchange: &Exchange, f: impl FnOnce(&mut Inner) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        if exchange.token.is_cancelled() || inner.generation != exchange.generation {
            return None;
        }
        Some(f(&mut inner))
    }

    fn finish(&self, exchange: &Exchange, result: Result<ExchangeEnd, ClientError>) -> SendOutcome {
        let mut inner = self.inner.lock();
        let current = inner.generation == exchange.generation;
        let live = current && !exchange.token.is_cancelled();
        if current {
            inner.cancel = None;
            inner.state.is_loading = false;
        }

        match result {
            Ok(ExchangeEnd::Completed) => {
                self.emit(SessionEvent::Completed);
                SendOutcome::Completed
            }
            Err(err) if live => {
                tracing::warn!(error = %err, "Exchange failed");
                inner.transcript.truncate(exchange.rollback_len);
                let message = err.to_string();
                inner.state.error = Some(message.clone());
                self.emit(SessionEvent::Failed {
                    message,
                    help: err.help(),
                });
                SendOutcome::Failed(err)
            }
            Ok(ExchangeEnd::Cancelled) | Err(_) => {
                self.emit(SessionEvent::Cancelled);
                SendOutcome::Cancelled
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Sending only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

impl<T> Clone for ChatSession<T>
where
    T: ChatTransport,
{
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
            signals: self.signals.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use chat_relay_store::MemoryStorage;
    use futures::channel::mpsc;

    use super::*;
    use crate::error::QUOTA_HELP;
    use crate::signals::UiSignal;

    enum Scripted {
        Json(&'static str),
        Chunks(Vec<Vec<u8>>),
        Channel(mpsc::UnboundedReceiver<crate::error::Result<Vec<u8>>>),
        Fail(ClientError),
        Hang,
    }

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Scripted>>,
        requests: Mutex<Vec<Vec<WireMessage>>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<WireMessage>> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, messages: &[WireMessage]) -> crate::error::Result<ChatResponse> {
            self.requests.lock().push(messages.to_vec());
            let next = self.replies.lock().pop_front();
            match next {
                Some(Scripted::Json(text)) => Ok(ChatResponse::Complete(text.to_string())),
                Some(Scripted::Chunks(chunks)) => Ok(ChatResponse::Stream(
                    futures::stream::iter(chunks.into_iter().map(Ok)).boxed(),
                )),
                Some(Scripted::Channel(rx)) => Ok(ChatResponse::Stream(rx.boxed())),
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::Hang) | None => std::future::pending().await,
            }
        }
    }

    fn frames(payloads: &[&str]) -> Vec<Vec<u8>> {
        payloads
            .iter()
            .map(|payload| format!("data: {payload}\n\n").into_bytes())
            .collect()
    }

    fn session_with(
        transport: &Arc<ScriptedTransport>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> ChatSession<ScriptedTransport> {
        ChatSession::new(Arc::clone(transport), storage, SignalBus::new())
    }

    fn session(transport: &Arc<ScriptedTransport>) -> ChatSession<ScriptedTransport> {
        session_with(transport, Arc::new(MemoryStorage::new()))
    }

    fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    fn contents(session: &ChatSession<ScriptedTransport>) -> Vec<(Role, String)> {
        session
            .transcript()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect()
    }

    #[tokio::test]
    async fn hello_streams_into_one_assistant_message() {
        let transport = ScriptedTransport::new(vec![Scripted::Chunks(frames(&[
            r#"{"content":"Hi"}"#,
            r#"{"content":" there"}"#,
            "[DONE]",
        ]))]);
        let session = session(&transport);
        let mut events = session.subscribe();

        assert!(matches!(session.send("hello").await, SendOutcome::Completed));

        assert_eq!(
            contents(&session),
            vec![
                (Role::User, "hello".to_string()),
                (Role::Assistant, "Hi there".to_string()),
            ]
        );
        assert_eq!(session.request_state(), RequestState::default());
        assert_eq!(
            transport.requests(),
            vec![vec![WireMessage::new(Role::User, "hello")]]
        );

        let events = drain(&mut events);
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], SessionEvent::MessageAppended(m) if m.role == Role::User));
        assert!(matches!(&events[1], SessionEvent::MessageAppended(m) if m.content.is_empty()));
        assert!(matches!(&events[2], SessionEvent::Delta { text, .. } if text == "Hi"));
        assert!(matches!(&events[3], SessionEvent::Delta { text, .. } if text == " there"));
        assert_eq!(events[4], SessionEvent::Completed);
    }

    #[tokio::test]
    async fn follow_up_sends_full_history() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Json("Hi there"),
            Scripted::Json("Fine, thanks"),
        ]);
        let session = session(&transport);

        session.send("hello").await;
        session.send("how are you?").await;

        assert_eq!(
            transport.requests()[1],
            vec![
                WireMessage::new(Role::User, "hello"),
                WireMessage::new(Role::Assistant, "Hi there"),
                WireMessage::new(Role::User, "how are you?"),
            ]
        );
    }

    #[tokio::test]
    async fn multibyte_text_split_across_chunks() {
        let mut body = b"data: {\"content\":\"".to_vec();
        body.extend_from_slice("안녕".as_bytes());
        body.extend_from_slice(b"\"}\n\ndata: [DONE]\n\n");
        let (head, tail) = body.split_at(b"data: {\"content\":\"".len() + 1);

        let transport = ScriptedTransport::new(vec![Scripted::Chunks(vec![
            head.to_vec(),
            tail.to_vec(),
        ])]);
        let session = session(&transport);

        session.send("hello").await;
        assert_eq!(session.transcript()[1].content, "안녕");
    }

    #[tokio::test]
    async fn quota_error_rolls_back_user_message() {
        let transport = ScriptedTransport::new(vec![Scripted::Fail(ClientError::Api {
            status: 429,
            message: "Quota exceeded: Resource has been exhausted".into(),
        })]);
        let session = session(&transport);
        let mut events = session.subscribe();

        let outcome = session.send("hello").await;
        assert!(matches!(&outcome, SendOutcome::Failed(err) if err.is_quota()));

        assert!(session.transcript().is_empty());
        let state = session.request_state();
        assert!(!state.is_loading);
        assert!(state.error.unwrap().contains("Quota exceeded"));

        let last = drain(&mut events).pop().unwrap();
        assert_eq!(
            last,
            SessionEvent::Failed {
                message: "Quota exceeded: Resource has been exhausted".into(),
                help: Some(QUOTA_HELP),
            }
        );
    }

    #[tokio::test]
    async fn error_frame_fails_and_restores_previous_transcript() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Json("Hi there"),
            Scripted::Chunks(frames(&[
                r#"{"content":"partial"}"#,
                r#"{"error":"upstream broke"}"#,
                r#"{"content":"ignored"}"#,
            ])),
        ]);
        let session = session(&transport);

        session.send("hello").await;
        let outcome = session.send("again").await;

        assert!(matches!(outcome, SendOutcome::Failed(ClientError::Remote(_))));
        assert_eq!(contents(&session).len(), 2);
        assert_eq!(
            session.request_state().error.as_deref(),
            Some("upstream broke")
        );

        session.dismiss_error();
        assert!(session.request_state().error.is_none());
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped_and_done_halts() {
        let transport = ScriptedTransport::new(vec![Scripted::Chunks(frames(&[
            "not json",
            r#"{"unexpected":true}"#,
            r#"{"content":"a"}"#,
            "[DONE]",
            r#"{"content":"b"}"#,
        ]))]);
        let session = session(&transport);

        assert!(matches!(session.send("hello").await, SendOutcome::Completed));
        assert_eq!(session.transcript()[1].content, "a");
        assert!(session.request_state().error.is_none());
    }

    #[tokio::test]
    async fn stop_mid_stream_keeps_partial_content() {
        let (tx, rx) = mpsc::unbounded();
        let transport = ScriptedTransport::new(vec![Scripted::Channel(rx)]);
        let session = session(&transport);
        let mut events = session.subscribe();

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.send("hello").await }
        });

        tx.unbounded_send(Ok(b"data: {\"content\":\"Hi\"}\n\n".to_vec()))
            .unwrap();
        loop {
            if let SessionEvent::Delta { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        assert!(session.stop());
        assert!(!session.request_state().is_loading);
        assert!(!session.stop());

        // Late fragments are never applied.
        let _ = tx.unbounded_send(Ok(b"data: {\"content\":\" there\"}\n\n".to_vec()));

        assert!(matches!(task.await.unwrap(), SendOutcome::Cancelled));
        assert_eq!(session.transcript()[1].content, "Hi");
        assert_eq!(session.request_state(), RequestState::default());
    }

    #[tokio::test]
    async fn send_is_ignored_while_in_flight() {
        let transport = ScriptedTransport::new(vec![Scripted::Hang]);
        let session = session(&transport);
        let mut events = session.subscribe();

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.send("first").await }
        });
        events.recv().await.unwrap();
        assert!(session.request_state().is_loading);

        assert!(matches!(session.send("second").await, SendOutcome::Ignored));
        assert!(matches!(session.send("   ").await, SendOutcome::Ignored));

        session.stop();
        assert!(matches!(task.await.unwrap(), SendOutcome::Cancelled));

        // Stopped before headers: the user message stays, nothing else was added.
        assert_eq!(contents(&session), vec![(Role::User, "first".to_string())]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn new_chat_clears_transcript_and_storage() {
        let storage = Arc::new(MemoryStorage::new());
        let transport = ScriptedTransport::new(vec![Scripted::Json("Hi there")]);
        let session = session_with(&transport, storage.clone());

        session.send("hello").await;
        assert_eq!(storage.len(), 1);

        session.new_chat();
        assert!(session.transcript().is_empty());
        assert!(storage.is_empty());
        assert_eq!(session.request_state(), RequestState::default());
    }

    #[tokio::test]
    async fn new_chat_cancels_in_flight_exchange() {
        let (tx, rx) = mpsc::unbounded();
        let transport = ScriptedTransport::new(vec![Scripted::Channel(rx)]);
        let session = session(&transport);
        let mut events = session.subscribe();

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.send("hello").await }
        });
        tx.unbounded_send(Ok(b"data: {\"content\":\"Hi\"}\n\n".to_vec()))
            .unwrap();
        loop {
            if let SessionEvent::Delta { .. } = events.recv().await.unwrap() {
                break;
            }
        }

        session.new_chat();
        let _ = tx.unbounded_send(Ok(b"data: {\"content\":\"late\"}\n\n".to_vec()));

        assert!(matches!(task.await.unwrap(), SendOutcome::Cancelled));
        assert!(session.transcript().is_empty());
        assert!(!session.request_state().is_loading);
    }

    #[tokio::test]
    async fn transcript_survives_restart() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let transport = ScriptedTransport::new(vec![Scripted::Json("Hi there")]);

        let first = session_with(&transport, Arc::clone(&storage));
        first.send("hello").await;

        let restored = session_with(&transport, storage);
        assert_eq!(restored.transcript(), first.transcript());
    }

    #[tokio::test]
    async fn movie_request_publishes_signal() {
        let transport = ScriptedTransport::new(vec![Scripted::Json("Sure!")]);
        let session = session(&transport);
        let mut signals = session.signals().subscribe();

        session.send("Show me James Cameron movies").await;
        assert_eq!(signals.try_recv().unwrap(), UiSignal::OpenMoviePanel);

        session.send("thanks").await;
        assert!(signals.try_recv().is_err());
    }
}
