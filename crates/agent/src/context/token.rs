//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Good enough
//! to keep a context under budget; never used for billing.

use chorus_core::{ChatMessage, Message};

/// Per-message overhead for role name, author prefix and delimiters.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a feed message as it will be shown to the model
/// (`author: body`).
pub fn estimate_message_tokens(message: &Message) -> usize {
    MESSAGE_OVERHEAD + estimate_tokens(&message.author_id) + estimate_tokens(&message.body)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

pub fn estimate_chat_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| MESSAGE_OVERHEAD + estimate_tokens(&m.content))
        .sum()
}
