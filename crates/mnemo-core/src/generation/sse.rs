//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes are buffered until a full line is available, so multi-byte
//! characters split across network chunks decode correctly.

/// Collects `data:` payloads, one string per dispatched event
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the payloads of every completed event
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            self.process_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r'), &mut events);
        }
        events
    }

    /// Flush whatever remains once the body has ended
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw);
            self.process_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r'), &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        // comment / keep-alive
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_pushes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        assert_eq!(decoder.push(b"\ndata: [DONE]\n\n"), vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_crlf_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\nevent: message\r\nid: 7\r\ndata: x\r\n\r\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.push(b"data: a\ndata: b\n\n"), vec!["a\nb"]);
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["héllo"]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }
}
