//! Context source trait: read access to conversation history for tools.
//!
//! The context builder implements this; the context-lookup tools consume it
//! so that tools never talk to the feed directly.

use async_trait::async_trait;

use crate::error::ContextError;
use crate::message::{ConversationId, Message};

#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Up to `window` messages ending at `around_message_id`, oldest first.
    async fn short_context(
        &self,
        conversation_id: &ConversationId,
        around_message_id: &str,
        window: usize,
    ) -> Result<Vec<Message>, ContextError>;

    /// The full history up to `hard_cap` most recent messages, oldest first.
    async fn full_context(
        &self,
        conversation_id: &ConversationId,
        hard_cap: usize,
    ) -> Result<Vec<Message>, ContextError>;
}
