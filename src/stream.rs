use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream::BoxStream;
use serde::Deserialize;

use crate::error::SiroccoError;

/// One decoded unit from the server's line-delimited JSON stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub text: String,
    pub done: bool,
}

/// Wire shape of a single NDJSON line from `/api/generate`.
/// Unknown fields (timings, context arrays) are ignored.
#[derive(Deserialize)]
struct GenerateLine {
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Decode one raw line into a chunk.
///
/// Returns None for keep-alive blank lines, for malformed JSON (logged and
/// skipped — a bad line never aborts the stream), and for objects carrying
/// neither a text fragment nor a done marker.
pub fn decode_line(line: &[u8]) -> Option<StreamChunk> {
    let line = match line {
        [rest @ .., b'\r'] => rest,
        _ => line,
    };
    if line.is_empty() {
        return None;
    }

    let parsed: GenerateLine = match serde_json::from_slice(line) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("skipping malformed stream line: {e}");
            return None;
        }
    };

    if parsed.response.is_none() && !parsed.done {
        return None;
    }

    Some(StreamChunk {
        text: parsed.response.unwrap_or_default(),
        done: parsed.done,
    })
}

/// The byte stream a live HTTP response body decodes through.
pub type BodyStream = BoxStream<'static, Result<Bytes, SiroccoError>>;

/// Lazy decoder over a streaming response body.
///
/// Pull-based and forward-only: each poll buffers incoming bytes, splits
/// complete lines, and yields chunks in wire order. The inner byte stream
/// (and with it the HTTP connection) is dropped as soon as a done chunk is
/// yielded, a transport error surfaces, or the decoder itself is dropped.
/// Not restartable — a finished decoder only ever yields None.
pub struct ChunkStream<S = BodyStream> {
    inner: Option<S>,
    buf: Vec<u8>,
    pending: VecDeque<StreamChunk>,
}

impl<S> std::fmt::Debug for ChunkStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("buf", &self.buf)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl<S> ChunkStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(inner),
            buf: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Split complete lines out of the buffer and queue their chunks.
    /// Stops at a done chunk: lines after it are never decoded.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(chunk) = decode_line(&line[..line.len() - 1]) {
                let done = chunk.done;
                self.pending.push_back(chunk);
                if done {
                    self.buf.clear();
                    return;
                }
            }
        }
    }

    /// Decode whatever is left in the buffer as a final, unterminated line.
    fn drain_tail(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let tail = std::mem::take(&mut self.buf);
        if let Some(chunk) = decode_line(&tail) {
            self.pending.push_back(chunk);
        }
    }
}

impl<S> Stream for ChunkStream<S>
where
    S: Stream<Item = Result<Bytes, SiroccoError>> + Unpin,
{
    type Item = Result<StreamChunk, SiroccoError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(chunk) = this.pending.pop_front() {
                if chunk.done {
                    // Terminal chunk: release the connection now, not when
                    // the caller happens to drop us.
                    this.inner = None;
                    this.pending.clear();
                }
                return Poll::Ready(Some(Ok(chunk)));
            }

            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(inner).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buf.extend_from_slice(&bytes);
                    this.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    // Mid-stream transport failure terminates the sequence.
                    // Chunks already yielded stay yielded.
                    this.inner = None;
                    this.buf.clear();
                    this.pending.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    this.drain_tail();
                    if this.pending.is_empty() {
                        return Poll::Ready(None);
                    }
                }
            }
        }
    }
}
