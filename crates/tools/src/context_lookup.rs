//! Conversation-history tools: a short window around a message and the
//! (expensive) full history.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::{ContextSource, Message, Tool, ToolArgs, ToolContext, ToolError, ToolKind};

/// Render messages one per line for the model.
pub fn render_messages(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages.".into();
    }
    messages
        .iter()
        .map(|m| {
            format!(
                "[{}] {} ({}): {}",
                m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                m.author_id,
                m.id,
                m.body
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ContextLookupTool {
    source: Arc<dyn ContextSource>,
    window: usize,
}

impl ContextLookupTool {
    pub fn new(source: Arc<dyn ContextSource>, window: usize) -> Self {
        Self { source, window }
    }
}

#[async_trait]
impl Tool for ContextLookupTool {
    fn kind(&self) -> ToolKind {
        ToolKind::ContextLookup
    }

    fn description(&self) -> &str {
        "Fetch the messages leading up to a given message in this conversation."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message_id": {
                    "type": "string",
                    "description": "Message to look around (default: the message you are answering)"
                },
                "window": {
                    "type": "integer",
                    "description": "How many messages to return"
                }
            }
        })
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        let message_id = args.primary("message_id").unwrap_or(ctx.trigger_message_id.as_str());
        let window = args
            .integer("window")
            .map(|w| (w as usize).clamp(1, self.window.max(1)))
            .unwrap_or(self.window);

        let messages = self
            .source
            .short_context(&ctx.conversation_id, message_id, window)
            .await?;
        Ok(render_messages(&messages))
    }
}

pub struct LongContextLookupTool {
    source: Arc<dyn ContextSource>,
    hard_cap: usize,
}

impl LongContextLookupTool {
    pub fn new(source: Arc<dyn ContextSource>, hard_cap: usize) -> Self {
        Self { source, hard_cap }
    }
}

#[async_trait]
impl Tool for LongContextLookupTool {
    fn kind(&self) -> ToolKind {
        ToolKind::LongContextLookup
    }

    fn description(&self) -> &str {
        "Fetch the full history of this conversation. Expensive; use only when the recent messages are not enough."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of most recent messages to return"
                }
            }
        })
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        let cap = args
            .integer("limit")
            .map(|l| (l as usize).min(self.hard_cap))
            .unwrap_or(self.hard_cap);
        let messages = self.source.full_context(&ctx.conversation_id, cap).await?;
        Ok(render_messages(&messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{ContextError, ConversationId};
    use std::sync::Mutex;

    /// Returns one canned message and records the requests it saw.
    struct Canned {
        seen: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl ContextSource for Canned {
        async fn short_context(
            &self,
            _conversation_id: &ConversationId,
            around_message_id: &str,
            window: usize,
        ) -> Result<Vec<Message>, ContextError> {
            self.seen.lock().unwrap().push((around_message_id.to_string(), window));
            if around_message_id == "missing" {
                return Err(ContextError::MessageNotFound(around_message_id.into()));
            }
            Ok(vec![Message::new("alice", "earlier").with_id("m-1")])
        }

        async fn full_context(
            &self,
            _conversation_id: &ConversationId,
            hard_cap: usize,
        ) -> Result<Vec<Message>, ContextError> {
            self.seen.lock().unwrap().push(("*".into(), hard_cap));
            Ok(vec![])
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: "scout".into(),
            participant_id: "p-scout".into(),
            conversation_id: ConversationId::from("general"),
            trigger_message_id: "m-9".into(),
        }
    }

    #[tokio::test]
    async fn short_lookup_defaults_to_trigger_message() {
        let source = Arc::new(Canned { seen: Mutex::new(vec![]) });
        let tool = ContextLookupTool::new(source.clone(), 20);

        let out = tool.execute(&ToolArgs::parse(""), &ctx()).await.unwrap();
        assert!(out.contains("alice (m-1): earlier"));

        tool.execute(&ToolArgs::parse(r#"{"message_id":"m-4","window":500}"#), &ctx())
            .await
            .unwrap();
        assert_eq!(
            *source.seen.lock().unwrap(),
            vec![("m-9".to_string(), 20), ("m-4".to_string(), 20)]
        );
    }

    #[tokio::test]
    async fn missing_message_is_a_tool_error() {
        let tool = ContextLookupTool::new(Arc::new(Canned { seen: Mutex::new(vec![]) }), 5);
        let err = tool.execute(&ToolArgs::parse("missing"), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::Context(ContextError::MessageNotFound(_))));
    }

    #[tokio::test]
    async fn long_lookup_respects_hard_cap() {
        let source = Arc::new(Canned { seen: Mutex::new(vec![]) });
        let tool = LongContextLookupTool::new(source.clone(), 200);
        let out = tool.execute(&ToolArgs::parse(r#"{"limit": 5000}"#), &ctx()).await.unwrap();
        assert_eq!(out, "No messages.");
        assert_eq!(source.seen.lock().unwrap()[0].1, 200);
    }
}
