//! Normalization of provider streaming responses to canonical SSE.
//!
//! Providers speak four wire formats: OpenAI-shaped SSE (passed through
//! untouched by the gateway), Anthropic SSE events, Google's raw streamed
//! JSON array, and Ollama NDJSON. [`NormalizedStream`] re-emits the latter
//! three as canonical `data: {"choices":[{"delta":{"content":...}}]}`
//! frames and always terminates with `data: [DONE]`.
//!
//! Frames are emitted in upstream byte order; buffering exists only to
//! reassemble frames split across chunk boundaries. A line or fragment that
//! fails to parse is skipped, never fatal.

mod anthropic;
mod google;
mod json_scan;
mod ollama;

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;

pub use json_scan::JsonScanner;

/// Terminal frame closing every normalized stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Upstream wire formats that need re-framing.
///
/// OpenAI-compatible providers are absent here: their output already is the
/// canonical format and never passes through a [`NormalizedStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFraming {
    /// Anthropic SSE events.
    AnthropicSse,
    /// Google's raw streamed JSON array, no SSE framing.
    GoogleJson,
    /// Ollama newline-delimited JSON objects.
    OllamaNdjson,
}

/// Buffer bounds protecting against malformed or hostile upstreams.
#[derive(Debug, Clone, Copy)]
pub struct StreamingLimits {
    /// Maximum bytes of unconsumed upstream data held for reassembly.
    pub max_input_buffer_bytes: usize,
    /// Maximum generated frames awaiting the consumer.
    pub max_output_buffer_chunks: usize,
}

impl Default for StreamingLimits {
    fn default() -> Self {
        Self {
            max_input_buffer_bytes: 1024 * 1024,
            max_output_buffer_chunks: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingResponse,
    Streaming,
    Done,
}

enum FrameParser {
    Anthropic { buffer: Vec<u8> },
    Ollama { buffer: Vec<u8> },
    Google { scanner: JsonScanner },
}

impl FrameParser {
    fn for_framing(framing: UpstreamFraming) -> Self {
        match framing {
            UpstreamFraming::AnthropicSse => Self::Anthropic { buffer: Vec::new() },
            UpstreamFraming::OllamaNdjson => Self::Ollama { buffer: Vec::new() },
            UpstreamFraming::GoogleJson => Self::Google {
                scanner: JsonScanner::new(),
            },
        }
    }

    fn buffered_bytes(&self) -> usize {
        match self {
            Self::Anthropic { buffer } | Self::Ollama { buffer } => buffer.len(),
            Self::Google { scanner } => scanner.buffered_bytes(),
        }
    }

    fn process(&mut self, bytes: &[u8], out: &mut Vec<Bytes>) {
        match self {
            Self::Anthropic { buffer } => {
                buffer.extend_from_slice(bytes);
                drain_lines(buffer, out, anthropic::delta_text);
            }
            Self::Ollama { buffer } => {
                buffer.extend_from_slice(bytes);
                drain_lines(buffer, out, ollama::delta_text);
            }
            Self::Google { scanner } => {
                scanner.push(bytes);
                while let Some(object) = scanner.next_object() {
                    if let Some(delta) = google::delta_text(&object) {
                        push_delta(&delta, out);
                    }
                }
            }
        }
    }

    /// Flush a final unterminated line once the upstream ends. Incomplete
    /// JSON at the Google buffer tail is unrecoverable and dropped.
    fn finish(&mut self, out: &mut Vec<Bytes>) {
        match self {
            Self::Anthropic { buffer } => flush_tail(buffer, out, anthropic::delta_text),
            Self::Ollama { buffer } => flush_tail(buffer, out, ollama::delta_text),
            Self::Google { .. } => {}
        }
    }
}

fn drain_lines(buffer: &mut Vec<u8>, out: &mut Vec<Bytes>, extract: fn(&str) -> Option<String>) {
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        if let Ok(text) = std::str::from_utf8(&buffer[..pos]) {
            let line = text.trim();
            if !line.is_empty()
                && let Some(delta) = extract(line)
            {
                push_delta(&delta, out);
            }
        }
        buffer.drain(..=pos);
    }
}

fn flush_tail(buffer: &mut Vec<u8>, out: &mut Vec<Bytes>, extract: fn(&str) -> Option<String>) {
    if let Ok(text) = std::str::from_utf8(buffer) {
        let line = text.trim();
        if !line.is_empty()
            && let Some(delta) = extract(line)
        {
            push_delta(&delta, out);
        }
    }
    buffer.clear();
}

#[derive(Debug, Serialize)]
struct DeltaFrame<'a> {
    choices: [DeltaChoice<'a>; 1],
}

#[derive(Debug, Serialize)]
struct DeltaChoice<'a> {
    delta: DeltaContent<'a>,
}

#[derive(Debug, Serialize)]
struct DeltaContent<'a> {
    content: &'a str,
}

/// Wrap one delta in a canonical SSE frame. Empty deltas carry no
/// information and are not emitted.
fn push_delta(content: &str, out: &mut Vec<Bytes>) {
    if content.is_empty() {
        return;
    }
    let frame = DeltaFrame {
        choices: [DeltaChoice {
            delta: DeltaContent { content },
        }],
    };
    if let Ok(json) = serde_json::to_string(&frame) {
        out.push(Bytes::from(format!("data: {json}\n\n")));
    }
}

/// Stream adapter that re-frames a provider byte stream as canonical SSE.
///
/// Phases run `AwaitingResponse -> Streaming -> Done`; the terminal
/// `data: [DONE]` frame is appended exactly once when the upstream ends,
/// after any final unterminated line is flushed.
pub struct NormalizedStream<S> {
    inner: S,
    parser: FrameParser,
    phase: Phase,
    output_buffer: Vec<Bytes>,
    max_input_buffer_bytes: usize,
    max_output_buffer_chunks: usize,
    buffer_overflow: bool,
}

impl<S> NormalizedStream<S> {
    pub fn new(inner: S, framing: UpstreamFraming, limits: StreamingLimits) -> Self {
        Self {
            inner,
            parser: FrameParser::for_framing(framing),
            phase: Phase::AwaitingResponse,
            output_buffer: Vec::new(),
            max_input_buffer_bytes: limits.max_input_buffer_bytes,
            max_output_buffer_chunks: limits.max_output_buffer_chunks,
            buffer_overflow: false,
        }
    }

    fn process_bytes(&mut self, bytes: &[u8]) {
        if self.buffer_overflow {
            return;
        }

        if self.parser.buffered_bytes() + bytes.len() > self.max_input_buffer_bytes {
            tracing::error!(
                buffered = self.parser.buffered_bytes(),
                incoming = bytes.len(),
                max = self.max_input_buffer_bytes,
                "stream input buffer overflow, terminating"
            );
            self.buffer_overflow = true;
            return;
        }

        self.parser.process(bytes, &mut self.output_buffer);

        if self.output_buffer.len() > self.max_output_buffer_chunks {
            tracing::error!(
                buffered = self.output_buffer.len(),
                max = self.max_output_buffer_chunks,
                "stream output buffer overflow, terminating"
            );
            self.buffer_overflow = true;
        }
    }

    fn overflow_error() -> io::Error {
        io::Error::new(io::ErrorKind::OutOfMemory, "stream buffer overflow")
    }
}

impl<S> Stream for NormalizedStream<S>
where
    S: Stream<Item = Result<Bytes, io::Error>> + Unpin,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.buffer_overflow {
            return Poll::Ready(Some(Err(Self::overflow_error())));
        }

        // Drain generated frames before pulling more upstream bytes.
        if !self.output_buffer.is_empty() {
            return Poll::Ready(Some(Ok(self.output_buffer.remove(0))));
        }

        if self.phase == Phase::Done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                if self.phase == Phase::AwaitingResponse {
                    self.phase = Phase::Streaming;
                    tracing::debug!(bytes = bytes.len(), "upstream started streaming");
                }
                self.process_bytes(&bytes);

                if self.buffer_overflow {
                    return Poll::Ready(Some(Err(Self::overflow_error())));
                }

                if !self.output_buffer.is_empty() {
                    Poll::Ready(Some(Ok(self.output_buffer.remove(0))))
                } else {
                    // Consumed bytes without producing a frame yet.
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                let this = &mut *self;
                this.parser.finish(&mut this.output_buffer);
                self.output_buffer.push(Bytes::from_static(DONE_FRAME.as_bytes()));
                self.phase = Phase::Done;
                Poll::Ready(Some(Ok(self.output_buffer.remove(0))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
