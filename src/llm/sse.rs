//! Decoder for the `data: <json>` line stream returned when `stream` is set.
//!
//! Network reads and logical lines are unrelated: a read may carry half a
//! line or several lines, so raw bytes are buffered until a `\n` arrives.
//! Each parsed JSON object becomes one [`GenerationChunk`]; joining the text
//! fragments is left to the caller.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::types::{CompletionError, CompletionPayload, GenerationChunk};

const DATA_PREFIX: &[u8] = b"data:";
const DONE_SENTINEL: &str = "[DONE]";

pub type ChunkResult = Result<GenerationChunk, CompletionError>;

/// Incremental byte-to-chunk decoder
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no `\n`
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read, returning every chunk completed by it
    pub fn push(&mut self, piece: &[u8]) -> Vec<ChunkResult> {
        self.buffer.extend_from_slice(piece);

        let mut decoded = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let line_end = self.scanned + offset;
            if let Some(result) = parse_line(&self.buffer[line_start..line_end]) {
                decoded.push(result);
            }
            line_start = line_end + 1;
            self.scanned = line_start;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();
        decoded
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Vec<ChunkResult> {
        self.scanned = 0;
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// `None` for lines that carry no event (blank, comments, other fields, `[DONE]`)
fn parse_line(line: &[u8]) -> Option<ChunkResult> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        if !line.is_empty() {
            tracing::trace!(len = line.len(), "Discarding non-data stream line");
        }
        return None;
    };

    let payload = match std::str::from_utf8(payload) {
        Ok(text) => text.trim(),
        Err(e) => {
            return Some(Err(CompletionError::Decode {
                message: format!("stream line is not valid UTF-8: {}", e),
            }))
        }
    };

    if payload == DONE_SENTINEL {
        return None;
    }

    Some(
        serde_json::from_str::<CompletionPayload>(payload)
            .map(GenerationChunk::from)
            .map_err(|e| CompletionError::Decode {
                message: format!("malformed stream event: {}", e),
            }),
    )
}

struct DecodeState<S> {
    bytes: S,
    decoder: LineDecoder,
    pending: VecDeque<ChunkResult>,
    exhausted: bool,
}

/// Lazily turn a response body into chunks.
///
/// The stream ends when the transport does, or right after the first error.
pub fn decode_stream<S, E>(bytes: S) -> impl Stream<Item = ChunkResult>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let state = DecodeState {
        bytes,
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.exhausted = true;
                }
                return Some((item, state));
            }

            if state.exhausted {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(piece)) => {
                    let decoded = state.decoder.push(&piece);
                    state.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((
                        Err(CompletionError::Network {
                            message: e.to_string(),
                        }),
                        state,
                    ));
                }
                None => {
                    state.exhausted = true;
                    let decoded = state.decoder.finish();
                    state.pending.extend(decoded);
                }
            }
        }
    })
}
