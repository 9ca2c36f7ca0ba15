//! Channel-tagged output parsing.
//!
//! A response is a sequence of messages, each with a header (role, channel
//! name, optional `to=` recipient, optional `<|constrain|>` format) and a
//! body. Text outside any message is kept as visible text.

use chorus_core::{ToolCall, ToolName};

use crate::tokens::{Marker, Token, lex};

/// One piece of a parsed response, in order of appearance.
#[derive(Debug, PartialEq)]
pub(crate) enum Segment {
    Visible(String),
    Call(ToolCall),
}

#[derive(Default)]
struct Header {
    start: String,
    channel: String,
    has_channel: bool,
    in_constrain: bool,
}

impl Header {
    fn push(&mut self, text: &str) {
        if self.in_constrain {
            return;
        }
        if self.has_channel {
            self.channel.push_str(text);
        } else {
            self.start.push_str(text);
        }
    }

    fn channel_name(&self) -> Option<String> {
        self.channel
            .split_whitespace()
            .find(|w| !w.starts_with("to="))
            .map(|w| w.to_ascii_lowercase())
    }

    fn recipient(&self) -> Option<&str> {
        self.start
            .split_whitespace()
            .chain(self.channel.split_whitespace())
            .find_map(|w| w.strip_prefix("to="))
            .filter(|r| !r.is_empty())
    }

    /// Header text as written, for fail-open preservation.
    fn raw(&self) -> String {
        let mut raw = self.start.trim().to_string();
        if self.has_channel {
            if !raw.is_empty() {
                raw.push(' ');
            }
            raw.push_str(self.channel.trim());
        }
        raw
    }
}

enum State {
    Outside,
    Header(Header),
    Body(Header, String),
}

/// Parse channel-tagged text into ordered segments.
pub(crate) fn parse(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut state = State::Outside;

    for token in lex(input) {
        state = match (state, token) {
            (State::Outside, Token::Text(text)) => {
                push_visible(&mut segments, text);
                State::Outside
            }
            (State::Outside, Token::Marker(Marker::Start)) => State::Header(Header::default()),
            (State::Outside, Token::Marker(Marker::Channel)) => State::Header(Header {
                has_channel: true,
                ..Header::default()
            }),
            // Stray terminators and body markers outside a message are dropped
            (State::Outside, Token::Marker(_)) => State::Outside,

            (State::Header(mut header), Token::Text(text)) => {
                header.push(text);
                State::Header(header)
            }
            (State::Header(mut header), Token::Marker(Marker::Channel)) => {
                header.has_channel = true;
                header.in_constrain = false;
                State::Header(header)
            }
            (State::Header(mut header), Token::Marker(Marker::Constrain)) => {
                header.in_constrain = true;
                State::Header(header)
            }
            (State::Header(header), Token::Marker(Marker::Message)) => {
                State::Body(header, String::new())
            }
            (State::Header(header), Token::Marker(Marker::Start)) => {
                malformed(&mut segments, &header);
                State::Header(Header::default())
            }
            (State::Header(header), Token::Marker(_)) => {
                malformed(&mut segments, &header);
                State::Outside
            }

            (State::Body(header, mut body), Token::Text(text)) => {
                body.push_str(text);
                State::Body(header, body)
            }
            (State::Body(header, body), Token::Marker(marker)) if marker.terminates() => {
                finish(&mut segments, &header, body);
                State::Outside
            }
            // A new message may begin without the previous one being closed
            (State::Body(header, body), Token::Marker(Marker::Start)) => {
                finish(&mut segments, &header, body);
                State::Header(Header::default())
            }
            (State::Body(header, body), Token::Marker(Marker::Channel)) => {
                finish(&mut segments, &header, body);
                State::Header(Header {
                    has_channel: true,
                    ..Header::default()
                })
            }
            (State::Body(header, body), Token::Marker(_)) => State::Body(header, body),
        };
    }

    match state {
        State::Outside => {}
        State::Header(header) => malformed(&mut segments, &header),
        State::Body(header, body) => finish(&mut segments, &header, body),
    }
    segments
}

fn push_visible(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Visible(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(Segment::Visible(text.to_string()));
    }
}

fn malformed(segments: &mut Vec<Segment>, header: &Header) {
    let raw = header.raw();
    tracing::warn!(header = %raw, "Channel header without a message body, keeping it as text");
    push_visible(segments, &raw);
}

fn finish(segments: &mut Vec<Segment>, header: &Header, body: String) {
    if let Some(recipient) = header.recipient() {
        let name = recipient.strip_prefix("functions.").unwrap_or(recipient);
        segments.push(Segment::Call(ToolCall::new(ToolName::resolve(name), body.trim())));
        return;
    }

    match header.channel_name().as_deref() {
        Some("analysis" | "reasoning" | "thinking") => {
            tracing::trace!(len = body.len(), "Dropping reasoning channel content");
        }
        Some("final" | "commentary") | None => push_visible(segments, &body),
        Some(other) => {
            tracing::warn!(channel = other, "Unknown output channel, keeping its content as text");
            push_visible(segments, &body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::ToolKind;

    fn visible(segments: &[Segment]) -> String {
        segments
            .iter()
            .filter_map(|s| match s {
                Segment::Visible(t) => Some(t.as_str()),
                Segment::Call(_) => None,
            })
            .collect()
    }

    #[test]
    fn analysis_is_dropped_final_kept() {
        let raw = "<|start|>assistant<|channel|>analysis<|message|>the user wants X<|end|>\
                   <|start|>assistant<|channel|>final<|message|>Here is X.<|return|>";
        let segments = parse(raw);
        assert_eq!(visible(&segments), "Here is X.");
    }

    #[test]
    fn commentary_with_recipient_is_a_call() {
        let raw = "<|start|>assistant<|channel|>commentary to=functions.web_search <|constrain|>json<|message|>{\"query\":\"rust\"}<|call|>";
        let segments = parse(raw);
        assert_eq!(segments.len(), 1);
        match &segments[0] {
            Segment::Call(call) => {
                assert_eq!(call.tool, ToolName::Known(ToolKind::WebSearch));
                assert_eq!(call.arguments, "{\"query\":\"rust\"}");
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn recipient_in_start_header() {
        let raw = "<|start|>assistant to=functions.react<|channel|>commentary<|message|>{\"emoji\":\"🎉\"}<|call|>";
        match &parse(raw)[0] {
            Segment::Call(call) => assert_eq!(call.tool.kind(), Some(ToolKind::React)),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn unknown_recipient_is_unsupported_call() {
        let raw = "<|channel|>commentary to=functions.shell<|message|>rm -rf /<|call|>";
        match &parse(raw)[0] {
            Segment::Call(call) => assert_eq!(call.tool, ToolName::Unsupported("shell".into())),
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_final_at_end_is_kept() {
        assert_eq!(visible(&parse("<|channel|>final<|message|>partial answer")), "partial answer");
    }

    #[test]
    fn missing_message_marker_fails_open() {
        let segments = parse("<|channel|>final Hello there<|end|>");
        assert_eq!(visible(&segments), "final Hello there");
    }

    #[test]
    fn unknown_channel_content_kept() {
        assert_eq!(visible(&parse("<|channel|>banter<|message|>hi<|end|>")), "hi");
    }

    #[test]
    fn plain_text_around_messages_is_visible() {
        let raw = "Intro. <|channel|>analysis<|message|>secret<|end|>Outro.";
        assert_eq!(visible(&parse(raw)), "Intro. Outro.");
    }

    #[test]
    fn consecutive_channels_without_end() {
        let raw = "<|channel|>analysis<|message|>think<|channel|>final<|message|>answer";
        assert_eq!(visible(&parse(raw)), "answer");
    }
}
