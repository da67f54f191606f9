//! Incremental decoder for `text/event-stream` bodies.
//!
//! Only the `data` field matters to the protocol: each event carries one
//! base64 record. Other fields and comment lines (keep-alives) are skipped.
//! Input may arrive split at any byte boundary.

/// Streaming server-sent-events decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the stream, returning the data of every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if line.starts_with(':') {
                continue;
            } else if let Some(value) = line.strip_prefix("data") {
                match value.strip_prefix(':') {
                    Some(value) => {
                        let value = value.strip_prefix(' ').unwrap_or(value);
                        self.data.push(value.to_string());
                    }
                    // "data" alone is a field with an empty value
                    None if value.is_empty() => self.data.push(String::new()),
                    None => {}
                }
            }
        }
        events
    }

    /// Bytes buffered waiting for a line ending.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}
