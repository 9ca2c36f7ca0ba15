//! Builds bounded views of the conversation from the message feed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chorus_core::{ContextError, ContextSource, ConversationId, Message, MessageFeed};
use tracing::debug;

use super::normalize;

/// Ids of messages this agent posted that have not yet come back through
/// polling. They are kept out of every context.
#[derive(Debug, Clone, Default)]
pub struct PendingAcks(Arc<Mutex<HashSet<String>>>);

impl PendingAcks {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, message_id: impl Into<String>) {
        self.lock().insert(message_id.into());
    }

    /// Mark a message as seen in the feed. Returns whether it was pending.
    pub fn acknowledge(&self, message_id: &str) -> bool {
        self.lock().remove(message_id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.lock().contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ContextBuilder {
    feed: Arc<dyn MessageFeed>,
    participant_id: String,
    pending: PendingAcks,
}

impl ContextBuilder {
    pub fn new(feed: Arc<dyn MessageFeed>, participant_id: impl Into<String>) -> Self {
        Self {
            feed,
            participant_id: participant_id.into(),
            pending: PendingAcks::default(),
        }
    }

    pub fn pending(&self) -> &PendingAcks {
        &self.pending
    }

    /// Full history, normalized, without this agent's pending messages.
    async fn history(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, ContextError> {
        let messages = self.feed.list_messages(None, conversation_id).await?;
        Ok(normalize(messages)
            .into_iter()
            .filter(|m| !(m.author_id == self.participant_id && self.pending.contains(&m.id)))
            .collect())
    }

    /// Up to `window` messages ending with `around_message_id`, oldest first.
    pub async fn build_short_context(
        &self,
        conversation_id: &ConversationId,
        around_message_id: &str,
        window: usize,
    ) -> Result<Vec<Message>, ContextError> {
        let history = self.history(conversation_id).await?;
        let anchor = history
            .iter()
            .position(|m| m.id == around_message_id)
            .ok_or_else(|| ContextError::MessageNotFound(around_message_id.to_string()))?;

        let start = (anchor + 1).saturating_sub(window.max(1));
        debug!(
            conversation_id = %conversation_id,
            anchor = around_message_id,
            count = anchor + 1 - start,
            "Built short context"
        );
        Ok(history[start..=anchor].to_vec())
    }

    /// The most recent `hard_cap` messages of the whole history.
    pub async fn build_full_context(
        &self,
        conversation_id: &ConversationId,
        hard_cap: usize,
    ) -> Result<Vec<Message>, ContextError> {
        let mut history = self.history(conversation_id).await?;
        if history.len() > hard_cap {
            history.drain(..history.len() - hard_cap);
        }
        debug!(conversation_id = %conversation_id, count = history.len(), "Built full context");
        Ok(history)
    }
}

#[async_trait]
impl ContextSource for ContextBuilder {
    async fn short_context(
        &self,
        conversation_id: &ConversationId,
        around_message_id: &str,
        window: usize,
    ) -> Result<Vec<Message>, ContextError> {
        self.build_short_context(conversation_id, around_message_id, window)
            .await
    }

    async fn full_context(
        &self,
        conversation_id: &ConversationId,
        hard_cap: usize,
    ) -> Result<Vec<Message>, ContextError> {
        self.build_full_context(conversation_id, hard_cap).await
    }
}
