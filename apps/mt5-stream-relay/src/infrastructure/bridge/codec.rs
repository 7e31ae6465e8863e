//! SSE Frame Codec
//!
//! Decodes the bridge's Server-Sent Events stream into bar events.
//!
//! The bridge separates frames with a blank line and uses two frame
//! shapes:
//!
//! ```text
//! data: {"type":"bar-update","bar":{...},"_seq":42}
//!
//! :hb
//! ```
//!
//! Comment frames (`:hb` heartbeats) and payloads that fail to decode
//! are skipped; only transport-level failures surface as stream
//! errors, so a skipped frame never tears down a session.

use bytes::BytesMut;

use crate::domain::streaming::StreamEvent;

/// Incremental decoder over raw SSE bytes.
///
/// Feed chunks with [`extend`](Self::extend), then drain decoded
/// events with [`next_event`](Self::next_event). Partial frames stay
/// buffered across chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes from the transport.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Decode the next event, skipping heartbeats and unparseable
    /// frames. Returns `None` when no complete frame remains buffered.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        while let Some(frame) = self.next_frame() {
            if let Some(event) = decode_frame(&frame) {
                return Some(event);
            }
        }
        None
    }

    /// Split the next complete frame off the buffer.
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        let (end, delimiter_len) = find_frame_end(&self.buffer)?;
        let frame = self.buffer.split_to(end + delimiter_len);
        Some(frame[..end].to_vec())
    }
}

/// Find the earliest frame delimiter, bare or CRLF style.
fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subsequence(buffer, b"\n\n").map(|at| (at, 2));
    let crlf = find_subsequence(buffer, b"\r\n\r\n").map(|at| (at, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (found, None) | (None, found) => found,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode one frame's payload, `None` for heartbeats and frames the
/// event model does not recognize.
fn decode_frame(frame: &[u8]) -> Option<StreamEvent> {
    let text = match std::str::from_utf8(frame) {
        Ok(text) => text,
        Err(error) => {
            tracing::debug!(%error, "dropping non UTF-8 sse frame");
            return None;
        }
    };

    let mut payload = String::new();
    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            if !payload.is_empty() {
                payload.push('\n');
            }
            payload.push_str(data.strip_prefix(' ').unwrap_or(data));
        }
        // Other SSE fields (event:, id:, retry:) are not used by the
        // bridge and are ignored.
    }

    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str(&payload) {
        Ok(event) => Some(event),
        Err(error) => {
            tracing::debug!(%error, "dropping undecodable sse payload");
            None
        }
    }
}
