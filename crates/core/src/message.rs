//! Conversation message types.
//!
//! Messages are produced by the external feed and are read-only to the
//! orchestration core: a feed message is polled → a trigger is detected →
//! context is built from its neighbours → a reply is posted back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single message in a shared conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (assigned by the feed)
    pub id: String,

    /// Participant that authored the message
    pub author_id: String,

    /// The text content
    pub body: String,

    /// When the feed accepted the message
    pub timestamp: DateTime<Utc>,

    /// The message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    /// Participant ids explicitly mentioned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,

    /// Opaque feed metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Create a message with a fresh id, timestamped now.
    pub fn new(author_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            author_id: author_id.into(),
            body: body.into(),
            timestamp: Utc::now(),
            reply_to: None,
            mentions: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn mentioning(mut self, participant_id: impl Into<String>) -> Self {
        self.mentions.push(participant_id.into());
        self
    }

    /// The position of this message in the feed ordering.
    pub fn cursor(&self) -> MessageCursor {
        MessageCursor {
            timestamp: self.timestamp,
            id: self.id.clone(),
        }
    }

    /// Whether the message addresses the given participant, either through
    /// the explicit mention list or an `@name` token in the body.
    pub fn addresses(&self, participant_id: &str, mention_names: &[String]) -> bool {
        if self.mentions.iter().any(|m| m == participant_id) {
            return true;
        }
        let names = std::iter::once(participant_id).chain(mention_names.iter().map(String::as_str));
        names
            .filter(|n| !n.is_empty())
            .any(|name| body_mentions(&self.body, name))
    }
}

/// Case-insensitive, word-bounded search for `@name` in a message body.
fn body_mentions(body: &str, name: &str) -> bool {
    let needle = format!("@{}", name.to_lowercase());
    let haystack = body.to_lowercase();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(&needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_');
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric() && c != '_' && c != '-');
        if before_ok && after_ok {
            return true;
        }
        start = end;
    }
    false
}

/// A totally ordered position in the feed: timestamp first, id as tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageCursor {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

impl std::fmt::Display for MessageCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.timestamp.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_message() {
        let msg = Message::new("user-1", "Hello, agents!");
        assert_eq!(msg.author_id, "user-1");
        assert_eq!(msg.body, "Hello, agents!");
        assert!(msg.mentions.is_empty());
        assert!(msg.reply_to.is_none());
    }

    #[test]
    fn explicit_mention_addresses() {
        let msg = Message::new("user-1", "hi").mentioning("bot-7");
        assert!(msg.addresses("bot-7", &[]));
        assert!(!msg.addresses("bot-8", &[]));
    }

    #[test]
    fn at_name_in_body_addresses() {
        let names = vec!["Scout".to_string()];
        assert!(Message::new("u", "hey @scout, what's up?").addresses("bot-1", &names));
        assert!(Message::new("u", "@SCOUT").addresses("bot-1", &names));
        assert!(!Message::new("u", "hey @scouting party").addresses("bot-1", &names));
        assert!(!Message::new("u", "email me at a@scout").addresses("bot-1", &names));
        assert!(!Message::new("u", "scout is great").addresses("bot-1", &names));
    }

    #[test]
    fn cursor_orders_by_timestamp_then_id() {
        let t = Utc::now();
        let a = Message::new("u", "a").with_id("a").at(t).cursor();
        let b = Message::new("u", "b").with_id("b").at(t).cursor();
        let c = Message::new("u", "c")
            .with_id("0")
            .at(t + chrono::Duration::seconds(1))
            .cursor();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::new("user-1", "Test").replying_to("m-0");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
