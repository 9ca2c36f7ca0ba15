//! The system preamble: identity, capabilities, what this turn is for and
//! the tool catalog.

use chorus_core::{AgentConfig, ToolDefinition, TriggerKind};
use chorus_protocol::tool_catalog;

pub fn build_preamble(config: &AgentConfig, tools: &[ToolDefinition], trigger: TriggerKind) -> String {
    let mut out = String::new();

    if !config.system_prompt.trim().is_empty() {
        out.push_str(config.system_prompt.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Identity\n\n");
    out.push_str(&format!(
        "You are {} (participant `{}`) in a shared group conversation with people and other agents. \
         Messages from others appear as `[message id] author: text`; your own earlier messages appear as your turns.\n\n",
        config.name(),
        config.participant_id
    ));

    out.push_str("## Capabilities\n\n");
    let caps = &config.capabilities;
    if caps.responds_when_addressed {
        out.push_str("- You answer when someone mentions you.\n");
    }
    if caps.responds_proactively {
        out.push_str("- You may join the conversation unprompted when you have something useful to add.\n");
    }
    if caps.can_react {
        out.push_str("- You can react to messages with an emoji instead of writing a reply.\n");
    }
    if caps.can_summarize {
        out.push_str("- You periodically summarize the discussion.\n");
    }
    out.push('\n');

    out.push_str("## This turn\n\n");
    out.push_str(match trigger {
        TriggerKind::Addressed => "You were mentioned in the last message. Answer it directly.",
        TriggerKind::Proactive => {
            "Nobody asked you directly. Reply only if you add something genuinely useful; \
             otherwise answer with an empty message and stay silent."
        }
        TriggerKind::Summarize => "Summarize the recent discussion: key points, decisions and open questions.",
    });
    out.push('\n');

    let catalog = tool_catalog(tools);
    if !catalog.is_empty() {
        out.push('\n');
        out.push_str(&catalog);
    }
    out
}
