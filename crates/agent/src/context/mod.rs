//! Conversation context for one trigger.
//!
//! ```text
//! feed history ──▶ ContextBuilder (window / full, dedup, no pending self)
//!              ──▶ ConversationContext { preamble, messages }
//!              ──▶ compress (token budget, keep k recent)
//!              ──▶ chat messages for inference
//! ```

pub mod builder;
pub mod compress;
pub mod preamble;
pub mod token;

pub use builder::{ContextBuilder, PendingAcks};
pub use compress::compress;
pub use preamble::build_preamble;

use std::collections::HashSet;

use chorus_core::{ChatMessage, Message};

/// An ordered, deduplicated view of the conversation plus the system
/// preamble. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    preamble: String,
    messages: Vec<Message>,
}

impl ConversationContext {
    pub fn new(preamble: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            preamble: preamble.into(),
            messages: normalize(messages),
        }
    }

    /// Keep `messages` exactly as given. The caller guarantees they are
    /// already deduplicated and oldest first.
    pub(crate) fn from_ordered(preamble: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            preamble: preamble.into(),
            messages,
        }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> usize {
        token::estimate_tokens(&self.preamble) + token::estimate_messages_tokens(&self.messages)
    }

    /// Render for inference: the preamble as the system turn, the agent's
    /// own messages as assistant turns, everyone else as user turns
    /// prefixed with message id and author.
    pub fn to_chat_messages(&self, participant_id: &str) -> Vec<ChatMessage> {
        let mut chat = Vec::with_capacity(self.messages.len() + 1);
        chat.push(ChatMessage::system(&self.preamble));
        for message in &self.messages {
            if message.author_id == participant_id {
                chat.push(ChatMessage::assistant(&message.body));
            } else {
                chat.push(ChatMessage::user(format!(
                    "[{}] {}: {}",
                    message.id, message.author_id, message.body
                )));
            }
        }
        chat
    }
}

/// Drop repeated ids (first occurrence wins) and order oldest first.
pub(crate) fn normalize(messages: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut messages: Vec<Message> = messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect();
    messages.sort_by_key(Message::cursor);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::Role;
    use chrono::{Duration, Utc};

    #[test]
    fn context_is_ordered_and_deduplicated() {
        let t = Utc::now();
        let a = Message::new("alice", "first").with_id("a").at(t);
        let b = Message::new("bob", "second").with_id("b").at(t + Duration::seconds(1));
        let ctx = ConversationContext::new("sys", vec![b.clone(), a.clone(), b.clone()]);
        let ids: Vec<_> = ctx.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn own_messages_become_assistant_turns() {
        let t = Utc::now();
        let ctx = ConversationContext::new(
            "You are Scout.",
            vec![
                Message::new("alice", "@scout hi").with_id("m1").at(t),
                Message::new("p-scout", "hello!").with_id("m2").at(t + Duration::seconds(1)),
            ],
        );
        let chat = ctx.to_chat_messages("p-scout");
        assert_eq!(chat.len(), 3);
        assert_eq!(chat[0].role, Role::System);
        assert_eq!(chat[1].content, "[m1] alice: @scout hi");
        assert_eq!(chat[2].role, Role::Assistant);
        assert_eq!(chat[2].content, "hello!");
    }
}
