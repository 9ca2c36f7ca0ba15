//! In-process message feed.
//!
//! Records every post, reaction and heartbeat so tests can assert on what
//! the agents did. Timestamps are strictly increasing per feed.

use async_trait::async_trait;
use chorus_core::{ConversationId, FeedError, Message, MessageFeed};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A reaction posted to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub message_id: String,
    pub emoji: String,
    pub author_id: String,
}

#[derive(Default)]
struct State {
    messages: Vec<(ConversationId, Message)>,
    reactions: Vec<Reaction>,
    heartbeats: Vec<(String, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct InMemoryFeed {
    state: Mutex<State>,
    offline: AtomicBool,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Next timestamp strictly after every message already stored.
    fn next_timestamp(state: &State) -> DateTime<Utc> {
        let now = Utc::now();
        match state.messages.iter().map(|(_, m)| m.timestamp).max() {
            Some(last) if last >= now => last + chrono::Duration::microseconds(1),
            _ => now,
        }
    }

    /// Append a message as if another participant had posted it. The
    /// timestamp is replaced to keep the feed ordered.
    pub fn inject(&self, conversation_id: &ConversationId, mut message: Message) -> Message {
        let mut state = self.state();
        message.timestamp = Self::next_timestamp(&state);
        state.messages.push((conversation_id.clone(), message.clone()));
        message
    }

    /// Make every call fail with a connection error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), FeedError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(FeedError::Connection("feed offline".into()))
        } else {
            Ok(())
        }
    }

    /// Messages in a conversation, oldest first.
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.state()
            .messages
            .iter()
            .filter(|(c, _)| c == conversation_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Messages authored by `author_id` across all conversations.
    pub fn posts_by(&self, author_id: &str) -> Vec<Message> {
        self.state()
            .messages
            .iter()
            .filter(|(_, m)| m.author_id == author_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn reactions(&self) -> Vec<Reaction> {
        self.state().reactions.clone()
    }

    pub fn heartbeat_count(&self, agent_id: &str) -> usize {
        self.state().heartbeats.iter().filter(|(a, _)| a == agent_id).count()
    }
}

#[async_trait]
impl MessageFeed for InMemoryFeed {
    async fn list_messages(
        &self,
        since: Option<DateTime<Utc>>,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, FeedError> {
        self.check_online()?;
        let mut messages: Vec<Message> = self
            .messages(conversation_id)
            .into_iter()
            .filter(|m| since.is_none_or(|s| m.timestamp >= s))
            .collect();
        messages.sort_by_key(Message::cursor);
        Ok(messages)
    }

    async fn post_message(
        &self,
        author_id: &str,
        conversation_id: &ConversationId,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<Message, FeedError> {
        self.check_online()?;
        let mut message = Message::new(author_id, content);
        message.reply_to = reply_to.map(String::from);
        Ok(self.inject(conversation_id, message))
    }

    async fn post_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        author_id: &str,
    ) -> Result<(), FeedError> {
        self.check_online()?;
        let mut state = self.state();
        if !state.messages.iter().any(|(_, m)| m.id == message_id) {
            return Err(FeedError::NotFound(message_id.to_string()));
        }
        state.reactions.push(Reaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
            author_id: author_id.to_string(),
        });
        Ok(())
    }

    async fn post_heartbeat(&self, agent_id: &str) -> Result<(), FeedError> {
        self.check_online()?;
        self.state().heartbeats.push((agent_id.to_string(), Utc::now()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_are_ordered_and_filtered_by_since() {
        let feed = InMemoryFeed::new();
        let general = ConversationId::from("general");
        let other = ConversationId::from("other");

        let first = feed.inject(&general, Message::new("alice", "one"));
        feed.inject(&other, Message::new("bob", "elsewhere"));
        let second = feed
            .post_message("scout", &general, "two", Some(&first.id))
            .await
            .unwrap();
        assert!(second.timestamp > first.timestamp);
        assert_eq!(second.reply_to.as_deref(), Some(first.id.as_str()));

        let all = feed.list_messages(None, &general).await.unwrap();
        assert_eq!(all.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(), vec!["one", "two"]);

        let since = feed.list_messages(Some(second.timestamp), &general).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, second.id);
    }

    #[tokio::test]
    async fn reactions_require_an_existing_message() {
        let feed = InMemoryFeed::new();
        let msg = feed.inject(&ConversationId::from("c"), Message::new("alice", "nice"));

        feed.post_reaction(&msg.id, "👍", "scout").await.unwrap();
        assert_eq!(feed.reactions()[0].emoji, "👍");
        assert!(matches!(
            feed.post_reaction("missing", "👍", "scout").await,
            Err(FeedError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn offline_feed_fails_every_call() {
        let feed = InMemoryFeed::new();
        feed.set_offline(true);
        assert!(feed.post_heartbeat("scout").await.is_err());
        feed.set_offline(false);
        feed.post_heartbeat("scout").await.unwrap();
        assert_eq!(feed.heartbeat_count("scout"), 1);
    }
}
