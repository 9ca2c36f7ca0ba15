//! Message feed trait: the external conversation store.
//!
//! The feed owns persistence, authentication and reaction storage. Agents
//! only read messages from it and post replies, reactions and heartbeats
//! back, each authenticated with a per-agent bearer credential.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FeedError;
use crate::message::{ConversationId, Message};

#[async_trait]
pub trait MessageFeed: Send + Sync {
    /// Messages in the conversation with a timestamp at or after `since`,
    /// oldest first. `None` returns the full available history.
    async fn list_messages(
        &self,
        since: Option<DateTime<Utc>>,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, FeedError>;

    /// Post a message and return it as stored by the feed.
    async fn post_message(
        &self,
        author_id: &str,
        conversation_id: &ConversationId,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<Message, FeedError>;

    async fn post_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        author_id: &str,
    ) -> Result<(), FeedError>;

    /// Liveness signal for the given agent.
    async fn post_heartbeat(&self, agent_id: &str) -> Result<(), FeedError>;
}
