//! Shared fixtures for runtime and supervisor tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chorus_core::{AgentConfig, ConversationId, EventBus, FeedError, InferenceClient, Message, MessageFeed};
use chrono::{DateTime, Utc};
use chorus_feed::InMemoryFeed;
use chorus_tools::{Collaborators, HttpKnowledgeBase, HttpWebSearch, ToolExecutor, ToolLimits, builtin_tools};

use crate::context::ContextBuilder;
use crate::runtime::{AgentRuntime, RuntimeParts};

/// An agent `id` with participant id `p-{id}` and a short retry backoff.
pub fn agent_config(id: &str) -> AgentConfig {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "participant_id": format!("p-{id}"),
        "model": { "provider": "scripted" },
        "runtime": { "inference_retry_backoff_ms": 10, "poll_interval_ms": 50 }
    }))
    .unwrap()
}

/// A runtime over an in-memory feed.
pub fn runtime_for(
    config: AgentConfig,
    feed: &Arc<InMemoryFeed>,
    inference: Arc<dyn InferenceClient>,
) -> AgentRuntime {
    runtime_over(config, feed.clone(), inference)
}

/// A runtime over any feed.
pub fn runtime_over(
    config: AgentConfig,
    feed: Arc<dyn MessageFeed>,
    inference: Arc<dyn InferenceClient>,
) -> AgentRuntime {
    let parts = parts_over(&config, feed, inference, EventBus::new(64));
    AgentRuntime::new(Arc::new(config), parts)
}

/// Web search and the knowledge base are unconfigured, so those tools
/// always fail fast.
pub fn parts(
    config: &AgentConfig,
    feed: &Arc<InMemoryFeed>,
    inference: Arc<dyn InferenceClient>,
    events: EventBus,
) -> RuntimeParts {
    parts_over(config, feed.clone(), inference, events)
}

pub fn parts_over(
    config: &AgentConfig,
    feed: Arc<dyn MessageFeed>,
    inference: Arc<dyn InferenceClient>,
    events: EventBus,
) -> RuntimeParts {
    let context = Arc::new(ContextBuilder::new(feed.clone(), config.participant_id.clone()));
    RuntimeParts {
        executor: executor(&feed, &context, events.clone()),
        feed,
        inference,
        context,
        events,
    }
}

fn executor(feed: &Arc<dyn MessageFeed>, context: &Arc<ContextBuilder>, events: EventBus) -> ToolExecutor {
    let collaborators = Collaborators {
        feed: feed.clone(),
        context: context.clone(),
        knowledge_base: Arc::new(HttpKnowledgeBase::new(None, None, Duration::from_secs(1))),
        web_search: Arc::new(HttpWebSearch::new(None, None, Duration::from_secs(1))),
    };
    let limits = ToolLimits {
        context_window: 20,
        full_context_cap: 200,
        top_k: 5,
    };
    ToolExecutor::new(builtin_tools(&collaborators, limits)).with_events(events)
}

/// An in-memory feed with switchable faults: heartbeats that always fail,
/// and a history read (`since == None`) that comes back empty.
pub struct FaultyFeed {
    inner: Arc<InMemoryFeed>,
    failing_heartbeats: AtomicBool,
    history_hidden: AtomicBool,
}

impl FaultyFeed {
    pub fn new(inner: Arc<InMemoryFeed>) -> Self {
        Self {
            inner,
            failing_heartbeats: AtomicBool::new(false),
            history_hidden: AtomicBool::new(false),
        }
    }

    pub fn fail_heartbeats(&self, fail: bool) {
        self.failing_heartbeats.store(fail, Ordering::SeqCst);
    }

    pub fn hide_history(&self, hide: bool) {
        self.history_hidden.store(hide, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageFeed for FaultyFeed {
    async fn list_messages(
        &self,
        since: Option<DateTime<Utc>>,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, FeedError> {
        if since.is_none() && self.history_hidden.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.list_messages(since, conversation_id).await
    }

    async fn post_message(
        &self,
        author_id: &str,
        conversation_id: &ConversationId,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<Message, FeedError> {
        self.inner.post_message(author_id, conversation_id, content, reply_to).await
    }

    async fn post_reaction(&self, message_id: &str, emoji: &str, author_id: &str) -> Result<(), FeedError> {
        self.inner.post_reaction(message_id, emoji, author_id).await
    }

    async fn post_heartbeat(&self, agent_id: &str) -> Result<(), FeedError> {
        if self.failing_heartbeats.load(Ordering::SeqCst) {
            return Err(FeedError::Connection("heartbeat endpoint down".into()));
        }
        self.inner.post_heartbeat(agent_id).await
    }
}
