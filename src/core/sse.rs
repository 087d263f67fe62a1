//! Incremental decoder for server-sent-event `data:` framing

use bytes::{Buf, BytesMut};

/// One decoded SSE payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// The JSON (or other) payload of a `data:` line
    Data(String),
    /// The `[DONE]` terminator used by chat-completions streams
    Done,
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a full line arrives; the trailing partial line is
/// kept across `feed` calls. Non-`data:` lines (comments, event names, blank
/// keep-alives) are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Feed a chunk of bytes, returning every complete event it finishes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1); // the newline itself

            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches('\r').trim();

            if let Some(payload) = line.strip_prefix("data:") {
                let payload = payload.trim();
                if payload == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !payload.is_empty() {
                    events.push(SseEvent::Data(payload.to_string()));
                }
            }
        }

        events
    }
}
