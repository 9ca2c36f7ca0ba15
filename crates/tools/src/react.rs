//! Reaction tool: put an emoji on a message.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::{MessageFeed, Tool, ToolArgs, ToolContext, ToolError, ToolKind};
use tracing::debug;

pub struct ReactTool {
    feed: Arc<dyn MessageFeed>,
}

impl ReactTool {
    pub fn new(feed: Arc<dyn MessageFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl Tool for ReactTool {
    fn kind(&self) -> ToolKind {
        ToolKind::React
    }

    fn description(&self) -> &str {
        "React to a message with an emoji. A reaction on its own can be your whole reply."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "emoji": {
                    "type": "string",
                    "description": "The emoji to react with"
                },
                "message_id": {
                    "type": "string",
                    "description": "Message to react to (default: the message you are answering)"
                }
            },
            "required": ["emoji"]
        })
    }

    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        let emoji = args
            .primary("emoji")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'emoji' argument".into()))?;
        let message_id = args
            .field("message_id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(ctx.trigger_message_id.as_str());

        self.feed
            .post_reaction(message_id, emoji, &ctx.participant_id)
            .await?;
        debug!(agent_id = %ctx.agent_id, message_id, emoji, "Reaction posted");
        Ok(format!("Reacted {emoji} to message {message_id}"))
    }
}
