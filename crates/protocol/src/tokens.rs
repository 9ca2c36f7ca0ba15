//! Control tokens of the channel-tagged format and the lexer that splits
//! raw model output on them.
//!
//! ```text
//! <|start|>assistant<|channel|>analysis<|message|>...<|end|>
//! <|start|>assistant<|channel|>commentary to=functions.web_search <|constrain|>json<|message|>{"query":"x"}<|call|>
//! <|start|>assistant<|channel|>final<|message|>Here is what I found.<|return|>
//! ```

/// A known control token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Start,
    End,
    Message,
    Channel,
    Call,
    Return,
    Constrain,
    EndOfText,
}

impl Marker {
    pub const ALL: [Marker; 8] = [
        Marker::Start,
        Marker::End,
        Marker::Message,
        Marker::Channel,
        Marker::Call,
        Marker::Return,
        Marker::Constrain,
        Marker::EndOfText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "<|start|>",
            Self::End => "<|end|>",
            Self::Message => "<|message|>",
            Self::Channel => "<|channel|>",
            Self::Call => "<|call|>",
            Self::Return => "<|return|>",
            Self::Constrain => "<|constrain|>",
            Self::EndOfText => "<|endoftext|>",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "message" => Some(Self::Message),
            "channel" => Some(Self::Channel),
            "call" => Some(Self::Call),
            "return" => Some(Self::Return),
            "constrain" => Some(Self::Constrain),
            "endoftext" => Some(Self::EndOfText),
            _ => None,
        }
    }

    /// Markers that close a message body.
    pub fn terminates(&self) -> bool {
        matches!(self, Self::End | Self::Call | Self::Return | Self::EndOfText)
    }
}

/// One lexed piece of model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Marker(Marker),
}

/// Split `input` into text runs and known markers. Unknown `<|...|>`
/// sequences stay inside text runs.
pub fn lex(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = input[cursor..].find("<|") {
        let open = cursor + offset;
        let Some(close_offset) = input[open + 2..].find("|>") else {
            break;
        };
        let name_end = open + 2 + close_offset;
        match Marker::from_name(&input[open + 2..name_end]) {
            Some(marker) => {
                if open > text_start {
                    tokens.push(Token::Text(&input[text_start..open]));
                }
                tokens.push(Token::Marker(marker));
                cursor = name_end + 2;
                text_start = cursor;
            }
            None => cursor = open + 2,
        }
    }

    if text_start < input.len() {
        tokens.push(Token::Text(&input[text_start..]));
    }
    tokens
}

/// Whether the text contains any channel-format control token.
pub fn has_markers(input: &str) -> bool {
    Marker::ALL.iter().any(|m| input.contains(m.as_str()))
}

/// Remove every known control token, leaving all other content intact.
///
/// Idempotent: removal repeats until no token remains, so pieces that join
/// into a new token after one pass are removed too.
pub fn strip(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next: String = lex(&current)
            .into_iter()
            .filter_map(|t| match t {
                Token::Text(s) => Some(s),
                Token::Marker(_) => None,
            })
            .collect();
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_markers_and_text() {
        let tokens = lex("a<|channel|>final<|message|>hi<|end|>");
        assert_eq!(
            tokens,
            vec![
                Token::Text("a"),
                Token::Marker(Marker::Channel),
                Token::Text("final"),
                Token::Marker(Marker::Message),
                Token::Text("hi"),
                Token::Marker(Marker::End),
            ]
        );
    }

    #[test]
    fn unknown_markers_stay_in_text() {
        assert_eq!(lex("x <|weird|> y"), vec![Token::Text("x <|weird|> y")]);
        assert_eq!(lex("dangling <|start"), vec![Token::Text("dangling <|start")]);
    }

    #[test]
    fn strip_removes_only_control_tokens() {
        assert_eq!(strip("<|start|>Hello <|end|>world"), "Hello world");
        assert_eq!(strip("keep <|weird|> and [TAG:x]"), "keep <|weird|> and [TAG:x]");
        assert_eq!(strip(""), "");
    }

    #[test]
    fn strip_is_idempotent() {
        let inputs = [
            "plain text",
            "<|st<|end|>art|>nested",
            "<<|call|>|end|>|>",
            "<|<|message|>start|><|channel|>",
            "emoji 👍<|return|> and ünïcode",
            "<|",
            "|><|",
        ];
        for input in inputs {
            let once = strip(input);
            assert_eq!(strip(&once), once, "input: {input:?}");
            assert!(!has_markers(&once), "input: {input:?}");
        }
    }
}
