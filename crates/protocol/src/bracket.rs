//! Legacy inline bracket tags: `[TOOLNAME:argument]` embedded in visible
//! text.

use chorus_core::{ToolCall, ToolKind, ToolName};
use regex_lite::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Z][A-Z_]*):([^\]\n]*)\]").expect("bracket tag pattern is valid")
});

/// Extract known tags from `text`, appending calls in order of appearance
/// and returning the text with those tags removed. Only the exact uppercase
/// tag spellings count; anything else is left in place.
pub fn extract(text: &str, calls: &mut Vec<ToolCall>) -> String {
    let mut visible = String::with_capacity(text.len());
    let mut last = 0;

    for caps in TAG_RE.captures_iter(text) {
        let (Some(whole), Some(tag), Some(arg)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        match ToolKind::from_bracket_tag(tag.as_str()) {
            Some(kind) => {
                visible.push_str(&text[last..whole.start()]);
                calls.push(ToolCall::new(ToolName::Known(kind), arg.as_str()));
                last = whole.end();
            }
            None => {
                tracing::debug!(tag = tag.as_str(), "Leaving unrecognized bracket tag in text");
            }
        }
    }

    visible.push_str(&text[last..]);
    visible
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_web_search_tag() {
        let mut calls = Vec::new();
        let visible = extract("Sure! [WEB_SEARCH:openai gpt]", &mut calls);
        assert_eq!(visible, "Sure! ");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool, ToolName::Known(ToolKind::WebSearch));
        assert_eq!(calls[0].arguments, "openai gpt");
    }

    #[test]
    fn keeps_order_of_multiple_tags() {
        let mut calls = Vec::new();
        let visible = extract("[REACT:👍] a [KB_QUERY:pricing] b [CONTEXT:m-1]", &mut calls);
        assert_eq!(visible, " a  b ");
        let kinds: Vec<_> = calls.iter().map(|c| c.tool.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                Some(ToolKind::React),
                Some(ToolKind::KnowledgeBaseQuery),
                Some(ToolKind::ContextLookup)
            ]
        );
    }

    #[test]
    fn unknown_and_malformed_tags_untouched() {
        let mut calls = Vec::new();
        let text = "see [NOTE:later] and [WEB_SEARCH no colon] and [1:2]";
        assert_eq!(extract(text, &mut calls), text);
        assert!(calls.is_empty());
    }

    #[test]
    fn bracketed_prose_is_not_a_tag() {
        let mut calls = Vec::new();
        let text = "Note [context: the earlier thread] and [search: later] and [SEARCH:x]";
        assert_eq!(extract(text, &mut calls), text);
        assert!(calls.is_empty());
    }
}
