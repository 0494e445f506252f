//! Incremental parser for the `data:`-framed event stream used by
//! chat-completion endpoints.

/// Outcome of feeding one line into the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseLine {
    /// A complete `data:` payload.
    Data(String),
    /// The `[DONE]` sentinel; the stream is over.
    Done,
    /// Comment, blank line, or unknown field.
    Skip,
}

/// Byte-chunk splitter that yields complete lines across chunk boundaries.
#[derive(Debug, Default)]
pub struct SseScanner {
    buffer: String,
}

impl SseScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every completed line.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Remaining partial line when the stream ends.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}

/// Classify one line of the stream.
pub fn parse_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() {
        return SseLine::Skip;
    }
    if data == "[DONE]" {
        return SseLine::Done;
    }
    SseLine::Data(data.to_string())
}
