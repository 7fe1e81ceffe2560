//! Line-oriented decoding of streamed HTTP bodies
//!
//! Both the SSE and NDJSON formats are framed by newlines. Raw bytes are
//! buffered across HTTP chunks and only complete lines are decoded, so a
//! multi-byte character split between two chunks is never mangled.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use super::{DeltaStream, StreamDelta};
use crate::error::GenerationError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

/// What one decoded line contributes to the delta stream.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Frame {
    pub deltas: Vec<StreamDelta>,
    /// End-of-stream signal; later lines are ignored
    pub done: bool,
}

impl Frame {
    pub fn skip() -> Self {
        Self::default()
    }

    pub fn done() -> Self {
        Self {
            deltas: Vec::new(),
            done: true,
        }
    }
}

pub(crate) struct LineReader {
    inner: ByteStream,
    buffer: Vec<u8>,
    finished: bool,
}

impl LineReader {
    pub fn new<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + 'static,
    {
        Self {
            inner: Box::pin(stream.map(|chunk| chunk.map_err(|e| e.to_string()))),
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Next complete line without its terminator. A trailing line with no
    /// newline is still returned once the body ends.
    pub async fn next_line(&mut self) -> Option<Result<String, GenerationError>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Some(Ok(decode_line(&raw)));
            }

            if self.finished {
                if self.buffer.is_empty() {
                    return None;
                }
                let raw = std::mem::take(&mut self.buffer);
                return Some(Ok(decode_line(&raw)));
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(GenerationError::Stream(e)));
                }
                None => self.finished = true,
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

struct Decoder<F> {
    lines: LineReader,
    parse: F,
    pending: VecDeque<StreamDelta>,
    done: bool,
}

/// Turn a streamed body into a [`DeltaStream`] using a per-line parser.
///
/// The stream ends after a `done` frame, at the end of the body, or right
/// after yielding the first error.
pub(crate) fn decode_deltas<S, E, F>(body: S, parse: F) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
    F: Fn(&str) -> Result<Frame, GenerationError> + Send + 'static,
{
    let decoder = Decoder {
        lines: LineReader::new(body),
        parse,
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(decoder, |mut dec| async move {
        loop {
            if let Some(delta) = dec.pending.pop_front() {
                return Some((Ok(delta), dec));
            }
            if dec.done {
                return None;
            }

            match dec.lines.next_line().await {
                Some(Ok(line)) => match (dec.parse)(&line) {
                    Ok(frame) => {
                        dec.pending.extend(frame.deltas);
                        dec.done = frame.done;
                    }
                    Err(e) => {
                        dec.done = true;
                        return Some((Err(e), dec));
                    }
                },
                Some(Err(e)) => {
                    dec.done = true;
                    return Some((Err(e), dec));
                }
                None => return None,
            }
        }
    }))
}
