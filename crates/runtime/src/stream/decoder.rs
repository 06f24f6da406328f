//! Line-oriented stream decoding.

use crate::model::{ModelError, StreamEvent};
use crate::providers::ProviderAdapter;
use crate::transport::{ByteStream, StreamResponse};
use futures::StreamExt;
use std::sync::Arc;

/// Prefix of every line that carries a payload.
pub const DATA_PREFIX: &str = "data:";

/// Longest body excerpt kept in an [`ModelError::Http`].
pub const MAX_ERROR_SNIPPET: usize = 512;

/// Longest line accepted from a streamed body.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// What one line of the body amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line or keep-alive.
    Blank,
    /// Non-blank line that is not a data line (`event:`, comments, noise).
    Ignored,
    /// A data line, mapped to zero or more events.
    Events(Vec<StreamEvent>),
    /// The terminal sentinel.
    Done,
}

/// Maps body lines to events for one provider.
pub struct StreamDecoder {
    adapter: Arc<dyn ProviderAdapter>,
}

impl StreamDecoder {
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { adapter }
    }

    /// Decode one line. Malformed payloads are logged and skipped.
    pub fn decode_line(&self, line: &str) -> LineOutcome {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return LineOutcome::Blank;
        }
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return LineOutcome::Ignored;
        };
        let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
        if self.adapter.is_sentinel(data) {
            return LineOutcome::Done;
        }
        match self.adapter.parse_stream_event(data) {
            Ok(events) => {
                for event in &events {
                    tracing::trace!(provider = %self.adapter.kind(), ?event, "stream event");
                }
                LineOutcome::Events(events)
            }
            Err(e) => {
                tracing::warn!(
                    provider = %self.adapter.kind(),
                    error = %e,
                    data = %snippet(data, 200),
                    "skipping malformed stream line"
                );
                LineOutcome::Events(Vec::new())
            }
        }
    }
}

/// Splits a byte stream into lines.
///
/// Bytes are buffered until a newline so multi-byte characters split across
/// chunks decode correctly. A line longer than [`MAX_LINE_BYTES`] is an error.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Start of the first unconsumed line.
    start: usize,
    /// Everything before this offset has been searched for a newline.
    scanned: usize,
    /// Bytes after the last newline in `buf`.
    tail: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), ModelError> {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.tail = match chunk.iter().rposition(|&b| b == b'\n') {
            Some(i) => chunk.len() - i - 1,
            None => self.tail + chunk.len(),
        };
        if self.tail > MAX_LINE_BYTES {
            return Err(ModelError::Parse(format!(
                "stream line exceeds {MAX_LINE_BYTES} bytes"
            )));
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(i) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let end = self.scanned + i;
        let line = decode(&self.buf[self.start..end]);
        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// Whatever is left after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = (self.start < self.buf.len()).then(|| decode(&self.buf[self.start..]));
        *self = Self::default();
        rest
    }
}

fn decode(bytes: &[u8]) -> String {
    let line = String::from_utf8_lossy(bytes);
    let line: &str = &line;
    line.strip_suffix('\r').unwrap_or(line).to_string()
}

/// Pass a successful response through; otherwise read enough of it for an
/// error snippet.
pub async fn ensure_success(response: StreamResponse) -> Result<ByteStream, ModelError> {
    if (200..300).contains(&response.status) {
        return Ok(response.body);
    }

    let mut body = response.body;
    let mut raw = Vec::new();
    // Four bytes per char covers the snippet for any UTF-8.
    while raw.len() <= MAX_ERROR_SNIPPET * 4 {
        let Some(chunk) = body.next().await else {
            break;
        };
        match chunk {
            Ok(bytes) => raw.extend_from_slice(&bytes),
            Err(e) => {
                tracing::debug!(error = %e, "error while draining failed response");
                break;
            }
        }
    }
    let text = String::from_utf8_lossy(&raw);
    Err(ModelError::Http {
        status: response.status,
        body: snippet(text.trim(), MAX_ERROR_SNIPPET),
    })
}

/// At most `max` characters of `text`, cut on a char boundary.
pub fn snippet(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{self, ProviderKind};
    use bytes::Bytes;

    fn decoder(kind: ProviderKind) -> StreamDecoder {
        StreamDecoder::new(providers::adapter(kind, None))
    }

    #[test]
    fn classifies_lines() {
        let decoder = decoder(ProviderKind::OpenAi);
        assert_eq!(decoder.decode_line(""), LineOutcome::Blank);
        assert_eq!(decoder.decode_line("\r"), LineOutcome::Blank);
        assert_eq!(decoder.decode_line(": keep-alive"), LineOutcome::Ignored);
        assert_eq!(decoder.decode_line("event: message"), LineOutcome::Ignored);
        assert_eq!(decoder.decode_line("data: [DONE]"), LineOutcome::Done);
        assert_eq!(decoder.decode_line("data:[DONE]"), LineOutcome::Done);
        assert_eq!(
            decoder.decode_line(r#"data: {"choices":[{"delta":{"content":"a"}}]}"#),
            LineOutcome::Events(vec![StreamEvent::TextDelta("a".into())])
        );
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let decoder = decoder(ProviderKind::Anthropic);
        assert_eq!(
            decoder.decode_line("data: {\"type\": oops"),
            LineOutcome::Events(Vec::new())
        );
        assert_eq!(
            decoder.decode_line(r#"data: {"type":"message_stop"}"#),
            LineOutcome::Events(vec![StreamEvent::StreamEnd])
        );
    }

    #[test]
    fn line_buffer_handles_split_chunks_and_utf8() {
        let text = "data: 안녕\r\ndata: b\n";
        let bytes = text.as_bytes();
        let mut lines = LineBuffer::new();
        // split inside the multi-byte sequence of '안'
        lines.push(&bytes[..7]).unwrap();
        assert_eq!(lines.next_line(), None);
        lines.push(&bytes[7..]).unwrap();
        assert_eq!(lines.next_line().as_deref(), Some("data: 안녕"));
        assert_eq!(lines.next_line().as_deref(), Some("data: b"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish(), None);

        lines.push(b"data: tail").unwrap();
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish().as_deref(), Some("data: tail"));
    }

    #[test]
    fn line_longer_than_limit_is_rejected() {
        let long = vec![b'a'; MAX_LINE_BYTES];
        let mut lines = LineBuffer::new();
        lines.push(&long).unwrap();
        assert!(matches!(lines.push(b"a"), Err(ModelError::Parse(_))));

        let mut lines = LineBuffer::new();
        lines.push(&long).unwrap();
        lines.push(b"\nnext").unwrap();
        assert_eq!(lines.next_line().map(|l| l.len()), Some(MAX_LINE_BYTES));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.finish().as_deref(), Some("next"));
    }

    #[test]
    fn many_lines_in_one_chunk() {
        let mut lines = LineBuffer::new();
        let body = "data: x\n".repeat(10_000);
        lines.push(body.as_bytes()).unwrap();
        let mut count = 0;
        while let Some(line) = lines.next_line() {
            assert_eq!(line, "data: x");
            count += 1;
        }
        assert_eq!(count, 10_000);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        assert_eq!(snippet("héllo", 2), "hé…");
        assert_eq!(snippet("short", 10), "short");
    }

    #[tokio::test]
    async fn non_success_status_drains_body() {
        let chunks: Vec<Result<Bytes, ModelError>> = vec![
            Ok(Bytes::from_static(b"{\"error\":")),
            Ok(Bytes::from_static(b"\"invalid key\"}")),
        ];
        let response = StreamResponse {
            status: 401,
            body: futures::stream::iter(chunks).boxed(),
        };
        let err = ensure_success(response).await.err().unwrap();
        assert_eq!(
            err,
            ModelError::Http {
                status: 401,
                body: "{\"error\":\"invalid key\"}".into()
            }
        );
    }

    #[tokio::test]
    async fn endless_error_body_is_cut_short() {
        let response = StreamResponse {
            status: 503,
            body: futures::stream::repeat_with(|| Ok::<_, ModelError>(Bytes::from_static(b"overloaded ")))
                .boxed(),
        };
        let Err(ModelError::Http { status, body }) = ensure_success(response).await else {
            panic!("expected an HTTP error");
        };
        assert_eq!(status, 503);
        assert!(body.starts_with("overloaded overloaded"));
        assert!(body.ends_with('…'));
        assert_eq!(body.chars().count(), MAX_ERROR_SNIPPET + 1);
    }
}
