//! Line-buffered decoding of `text/event-stream` bodies.
//!
//! Reassembles SSE lines across network chunk boundaries and yields the
//! payload of every `data:` line. Other SSE fields (`event:`, `id:`,
//! `retry:`, comments) are ignored.

/// Maximum bytes buffered for a single unterminated line.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// A decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseData {
    /// A JSON (or other) payload.
    Payload(String),
    /// The `[DONE]` terminator.
    Done,
}

pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed a chunk of bytes and return every complete `data:` payload in it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = parse_line(&line) {
                out.push(data);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeded buffer cap, discarding"
            );
            self.buffer.clear();
        }

        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseData> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseData> {
    let line = std::str::from_utf8(raw).ok()?;
    let line = line.trim_end_matches(['\n', '\r']);

    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data == "[DONE]" {
        Some(SseData::Done)
    } else if data.is_empty() {
        None
    } else {
        Some(SseData::Payload(data.to_string()))
    }
}
