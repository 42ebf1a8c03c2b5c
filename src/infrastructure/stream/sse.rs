/// One decoded server-sent event. The event name is informational only;
/// the subscriber attempts any non-empty data body as an image batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser over the raw byte stream of a `text/event-stream`
/// response.
///
/// Handles the framing variations the backend mixes on one connection:
/// named events, anonymous data-only frames, `:` comment keep-alives,
/// multi-line `data:` bodies, and both LF and CRLF line endings. Events
/// are emitted on the blank line that terminates a frame.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        SseParser::default()
    }

    /// Feeds a chunk and returns every event completed by it.
    ///
    /// Chunks arrive on arbitrary byte boundaries, so bytes are buffered
    /// raw and only complete lines are decoded; a multibyte UTF-8
    /// sequence split across chunks reassembles intact.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.take_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.flush();
        }
        // Comment lines are keep-alives.
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            // id/retry fields are irrelevant here; resumption is never
            // attempted, reconnects always start a fresh stream.
            _ => {}
        }
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        let event = self.event_name.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(SseEvent { event, data })
    }
}
