//! Tool-call protocol codec.
//!
//! Model output arrives in one of two families, possibly mixed:
//!
//! - **Channel-tagged**: messages introduced by `<|channel|>NAME`, where
//!   `analysis` is private reasoning (never shown), `commentary to=X`
//!   carries a tool call for tool `X`, and `final` is the user-visible
//!   answer.
//! - **Legacy bracket tags**: `[WEB_SEARCH:query]` written inline in
//!   otherwise visible text.
//!
//! Parsing is fail-open: anything the codec does not recognize stays in
//! the visible text and is logged.
//!
//! ```text
//! raw text ──▶ channel segments ──▶ bracket tags per visible segment ──▶ strip ──▶ Parsed
//! ```

mod bracket;
mod catalog;
mod channel;
mod stream;
mod tokens;

pub use catalog::{render_assistant_turn, render_results, render_tool_call, tool_catalog};
pub use stream::StreamAssembler;
pub use tokens::{Marker, has_markers, strip};

use chorus_core::ToolCall;

use channel::Segment;

/// The codec's view of one model response.
#[derive(Debug, Default, PartialEq)]
pub struct Parsed {
    /// Text meant for the conversation, control tokens removed
    pub visible_text: String,

    /// Tool calls in order of appearance
    pub tool_calls: Vec<ToolCall>,
}

impl Parsed {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Split raw model output into visible text and tool calls.
pub fn parse(raw: &str) -> Parsed {
    let segments = if has_markers(raw) {
        channel::parse(raw)
    } else {
        vec![Segment::Visible(raw.to_string())]
    };

    let mut visible = String::with_capacity(raw.len());
    let mut tool_calls = Vec::new();
    for segment in segments {
        match segment {
            Segment::Visible(text) => visible.push_str(&bracket::extract(&text, &mut tool_calls)),
            Segment::Call(call) => tool_calls.push(call),
        }
    }

    Parsed {
        visible_text: strip(&visible),
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{ToolKind, ToolName};

    #[test]
    fn bracket_scenario() {
        let parsed = parse("Sure! [WEB_SEARCH:openai gpt]");
        assert_eq!(parsed.visible_text, "Sure! ");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].tool, ToolName::Known(ToolKind::WebSearch));
        assert_eq!(parsed.tool_calls[0].arguments, "openai gpt");
    }

    #[test]
    fn plain_text_is_untouched() {
        let parsed = parse("Just chatting, no tools. [not a tag] (x:y)");
        assert_eq!(parsed.visible_text, "Just chatting, no tools. [not a tag] (x:y)");
        assert!(!parsed.has_tool_calls());
    }

    #[test]
    fn mixed_formats_keep_order() {
        let raw = "<|channel|>commentary to=functions.context_lookup<|message|>{\"message_id\":\"m-3\"}<|call|>\
                   <|channel|>final<|message|>Checking [WEB_SEARCH:tokio select] now<|end|>\
                   <|channel|>commentary to=functions.react<|message|>👀<|call|>";
        let parsed = parse(raw);
        let kinds: Vec<_> = parsed.tool_calls.iter().map(|c| c.tool.kind()).collect();
        assert_eq!(
            kinds,
            vec![Some(ToolKind::ContextLookup), Some(ToolKind::WebSearch), Some(ToolKind::React)]
        );
        assert_eq!(parsed.visible_text, "Checking  now");
    }

    #[test]
    fn reasoning_never_reaches_visible_text() {
        let raw = "<|start|>assistant<|channel|>analysis<|message|>SECRET PLAN<|end|>\
                   <|start|>assistant<|channel|>final<|message|>Hello!<|return|>";
        let parsed = parse(raw);
        assert_eq!(parsed.visible_text, "Hello!");
        assert!(!parsed.visible_text.contains("SECRET"));
    }

    #[test]
    fn stray_markers_are_stripped() {
        assert_eq!(parse("Hi<|end|> there<|endoftext|>").visible_text, "Hi there");
    }
}
