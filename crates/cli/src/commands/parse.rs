//! `chorus parse`: run the protocol codec on a string.

use std::io::Read;

use chorus_core::ToolCall;

pub fn run(text: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let raw = if text == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        text.to_string()
    };

    let parsed = chorus_protocol::parse(&raw);
    let calls: Vec<ToolCall> = parsed
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| call.in_round(1, i))
        .collect();

    if json {
        let out = serde_json::json!({
            "visible_text": parsed.visible_text,
            "tool_calls": calls,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Visible text: {:?}", parsed.visible_text);
    if calls.is_empty() {
        println!("Tool calls: none");
    } else {
        println!("Tool calls:");
        for (i, call) in calls.iter().enumerate() {
            println!("  {}. {} {:?}", i + 1, call.tool, call.arguments);
        }
    }
    Ok(())
}
