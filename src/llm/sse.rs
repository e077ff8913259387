//! Server-sent-event decoding for streamed chat completions.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use super::provider::TextStream;
use crate::error::LlmError;

/// One decoded SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Contents of a `data:` line.
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Incremental line splitter for an SSE body.
///
/// Bytes are buffered until a full line arrives, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and return every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else if payload.is_empty() {
        None
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the text delta from one `data:` payload. Role-only and
/// usage-only chunks yield `None`.
pub fn parse_delta(payload: &str) -> Result<Option<String>, LlmError> {
    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| LlmError::StreamBroken {
            reason: format!("undecodable stream chunk: {e}"),
        })?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

struct DecodeState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Queue the events of one body chunk. Returns true once the stream is over.
    fn absorb(&mut self, events: Vec<SseEvent>) -> bool {
        for event in events {
            match event {
                SseEvent::Done => return true,
                SseEvent::Data(payload) => match parse_delta(&payload) {
                    Ok(Some(text)) => self.pending.push_back(Ok(text)),
                    Ok(None) => {}
                    Err(e) => {
                        self.pending.push_back(Err(e));
                        return true;
                    }
                },
            }
        }
        false
    }
}

/// Turn a raw SSE byte stream into a stream of text fragments.
///
/// The result ends after `[DONE]`. A transport error, an undecodable chunk,
/// or end-of-body before `[DONE]` yields one `Err` item after all fragments
/// received so far.
pub fn decode_text_stream<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let events = st.decoder.push(bytes.as_ref());
                    st.finished = st.absorb(events);
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(LlmError::StreamBroken {
                        reason: e.to_string(),
                    }));
                    st.finished = true;
                }
                None => {
                    let tail: Vec<SseEvent> = st.decoder.finish().into_iter().collect();
                    let done = st.absorb(tail);
                    if !done {
                        debug!("SSE body ended without [DONE]");
                        st.pending.push_back(Err(LlmError::StreamBroken {
                            reason: "stream ended before completion signal".to_string(),
                        }));
                    }
                    st.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}
