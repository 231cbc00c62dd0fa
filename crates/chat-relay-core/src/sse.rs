//! Incremental decoding of server-sent event streams.
//!
//! A stream is a sequence of frames separated by a blank line. Only the
//! `data:` lines of a frame matter here; other fields (`event:`, `id:`,
//! comments) are legal and ignored, and a frame without any data line is
//! dropped.
//!
//! Bytes are decoded statefully, so a multi-byte character split across two
//! network chunks comes out intact.
//!
//! # Example
//!
//! ```
//! use chat_relay_core::sse::FrameDecoder;
//!
//! let mut decoder = FrameDecoder::new();
//! assert!(decoder.push(b"data: {\"content\":\"Hi\"}").is_empty());
//! let frames = decoder.push(b"\n\ndata: [DONE]\n\n");
//! assert_eq!(frames, vec![r#"{"content":"Hi"}"#.to_string(), "[DONE]".to_string()]);
//! ```

use std::collections::VecDeque;

use futures::{stream, Stream, StreamExt};

/// Payload of the frame that terminates a reply stream.
pub const DONE: &str = "[DONE]";

/// Stateful decoder turning byte chunks into frame payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a frame boundary.
    buffer: String,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the payloads of every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let mut payloads = Vec::new();
        while let Some((end, separator)) = find_boundary(&self.buffer) {
            let frame: String = self.buffer.drain(..end + separator).collect();
            match frame_payload(&frame[..end]) {
                Some(payload) => payloads.push(payload),
                None => tracing::trace!(frame = %frame.trim_end(), "Ignoring frame without data"),
            }
        }
        payloads
    }

    /// Number of bytes held back waiting for a frame boundary.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    /// Signal end of input. An unterminated trailing frame is discarded.
    pub fn finish(&mut self) {
        if self.buffered_len() > 0 {
            tracing::debug!(
                bytes = self.buffered_len(),
                "Discarding unterminated frame at end of stream"
            );
        }
        self.buffer.clear();
        self.pending.clear();
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        // Invalid sequence: substitute and keep going.
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        // Truncated sequence: wait for the next chunk.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Locate the earliest blank-line boundary, returning its offset and length.
fn find_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|at| (at, 2));
    let crlf = buffer.find("\r\n\r\n").map(|at| (at, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Extract the data carried by one frame, joining multiple data lines.
fn frame_payload(frame: &str) -> Option<String> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| {
            line.strip_prefix("data:")
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        })
        .collect();

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

/// Adapt a stream of byte chunks into a lazy stream of frame payloads.
///
/// A transport error is yielded once and ends the stream.
pub fn frames<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = (bytes, FrameDecoder::new(), VecDeque::new(), false);

    stream::unfold(
        state,
        |(mut bytes, mut decoder, mut ready, mut ended)| async move {
            loop {
                if let Some(payload) = ready.pop_front() {
                    return Some((Ok(payload), (bytes, decoder, ready, ended)));
                }
                if ended {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => ready.extend(decoder.push(chunk.as_ref())),
                    Some(Err(err)) => {
                        ended = true;
                        return Some((Err(err), (bytes, decoder, ready, ended)));
                    }
                    None => {
                        decoder.finish();
                        ended = true;
                    }
                }
            }
        },
    )
}
