//! Server-sent-event line decoding shared by the streaming providers.

use chorus_core::StreamEvent;

/// One decoded SSE field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// `event: <type>`
    Event(String),
    /// `data: <payload>`
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Incremental line decoder: bytes in, complete frames out.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(event) = line.strip_prefix("event:") {
                frames.push(SseFrame::Event(event.trim().to_string()));
            } else if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    frames.push(SseFrame::Done);
                } else if !data.is_empty() {
                    frames.push(SseFrame::Data(data.to_string()));
                }
            }
        }
        frames
    }
}

/// Decode a generic event record `{"type": "...", "content": "..."}`.
pub fn event_record(data: &str) -> Option<StreamEvent> {
    serde_json::from_str(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_across_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let frames = decoder.push(b"1}\r\n\r\n: keep-alive\nevent: message_stop\ndata: [DONE]\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Data("{\"a\":1}".into()),
                SseFrame::Event("message_stop".into()),
                SseFrame::Done,
            ]
        );
    }

    #[test]
    fn decodes_event_records() {
        assert_eq!(
            event_record(r#"{"type":"channel-switch","content":"final"}"#),
            Some(StreamEvent::ChannelSwitch("final".into()))
        );
        assert_eq!(
            event_record(r#"{"type":"chunk","content":"hi"}"#),
            Some(StreamEvent::Chunk("hi".into()))
        );
        assert_eq!(event_record(r#"{"choices":[]}"#), None);
        assert_eq!(event_record("{not json"), None);
    }

    #[test]
    fn multibyte_text_survives_chunk_split() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"content\":\"héllo 👋\"}\n".as_bytes();
        // Split inside the four-byte emoji
        let split = line.len() - 5;
        assert!(decoder.push(&line[..split]).is_empty());
        let frames = decoder.push(&line[split..]);
        assert_eq!(frames, vec![SseFrame::Data("{\"content\":\"héllo 👋\"}".into())]);
    }
}
