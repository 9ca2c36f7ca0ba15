//! Request-side rendering: the tool catalog shown to the model, canonical
//! tool-call text, and tool results fed back into the next round.

use chorus_core::{ToolCall, ToolDefinition, ToolKind, ToolResult};

use crate::tokens::Marker;

/// Describe the available tools and how to call them, for the system
/// preamble. Empty when no tools are offered.
pub fn tool_catalog(definitions: &[ToolDefinition]) -> String {
    if definitions.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Tools\n\n");
    out.push_str("To call a tool, write a message on the commentary channel addressed to it:\n");
    out.push_str(&render_tool_call("NAME", "{\"arg\": \"value\"}"));
    out.push_str("\nor an inline tag `[TAG:argument]`. Tool results arrive in the next turn.\n\n");

    for def in definitions {
        let tag = ToolKind::from_name(&def.name)
            .map(|k| format!(" [{}:...]", k.bracket_tag()))
            .unwrap_or_default();
        out.push_str(&format!("- `{}`{}: {}\n", def.name, tag, def.description));
        if let Some(props) = def.parameters.get("properties").and_then(|p| p.as_object()) {
            for (name, schema) in props {
                let desc = schema.get("description").and_then(|d| d.as_str()).unwrap_or("");
                out.push_str(&format!("    - `{name}`: {desc}\n"));
            }
        }
    }
    out
}

/// Canonical channel-tagged form of one tool call.
pub fn render_tool_call(function_name: &str, arguments: &str) -> String {
    format!(
        "{}commentary to=functions.{function_name}{}{arguments}{}",
        Marker::Channel.as_str(),
        Marker::Message.as_str(),
        Marker::Call.as_str()
    )
}

/// Canonical text of an assistant turn: its visible text followed by its
/// tool calls, for re-insertion into the conversation.
pub fn render_assistant_turn(visible_text: &str, calls: &[ToolCall]) -> String {
    let mut out = visible_text.to_string();
    for call in calls {
        let name = match call.tool.kind() {
            Some(kind) => kind.function_name().to_string(),
            None => call.tool.to_string(),
        };
        out.push_str(&render_tool_call(&name, &call.arguments));
    }
    out
}

/// Render results in call order as one block of text.
pub fn render_results(results: &[ToolResult]) -> String {
    let mut out = String::from("Tool results:\n");
    for result in results {
        let status = if result.success { "ok" } else { "error" };
        out.push_str(&format!(
            "\n### {} {} ({status}, {} ms)\n",
            result.call_id,
            result.tool,
            result.latency.as_millis()
        ));
        match &result.error {
            Some(error) if !result.success => out.push_str(error),
            _ => out.push_str(&result.payload),
        }
        out.push('\n');
    }
    out
}
