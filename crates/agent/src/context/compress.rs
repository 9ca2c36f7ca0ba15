//! Deterministic, lossy context compression.
//!
//! When a context is over its token budget, every message except the
//! `keep_recent` newest is folded into one placeholder message holding a
//! short excerpt per message. If even the excerpts do not fit, the oldest
//! excerpts are dropped and counted instead.

use chorus_core::Message;

use super::ConversationContext;
use super::token::{estimate_message_tokens, estimate_tokens};

/// Author id of the placeholder message.
pub const SUMMARY_AUTHOR: &str = "summary";

/// Characters kept from the first line of each folded message.
const EXCERPT_CHARS: usize = 80;

pub fn compress(context: &ConversationContext, token_budget: usize, keep_recent: usize) -> ConversationContext {
    let messages = context.messages();
    if context.estimated_tokens() <= token_budget || messages.len() <= keep_recent {
        return context.clone();
    }

    let split = messages.len() - keep_recent;
    let (older, recent) = messages.split_at(split);

    let recent_tokens: usize = recent.iter().map(estimate_message_tokens).sum();
    let available = token_budget
        .saturating_sub(estimate_tokens(context.preamble()))
        .saturating_sub(recent_tokens);

    // The placeholder shares its timestamp with the last folded message, so
    // re-sorting could move it behind a recent message with the same time.
    let placeholder = summarize(older, available);
    let mut compressed = Vec::with_capacity(recent.len() + 1);
    compressed.push(placeholder);
    compressed.extend_from_slice(recent);
    ConversationContext::from_ordered(context.preamble(), compressed)
}

fn excerpt(message: &Message) -> String {
    let line = message.body.lines().next().unwrap_or("").trim();
    let mut out: String = line.chars().take(EXCERPT_CHARS).collect();
    if line.chars().count() > EXCERPT_CHARS || message.body.lines().nth(1).is_some() {
        out.push('…');
    }
    format!("- {}: {}", message.author_id, out)
}

/// Fold `older` (non-empty, oldest first) into one message that fits in
/// `available` tokens where possible.
fn summarize(older: &[Message], available: usize) -> Message {
    let (first, last) = match (older.first(), older.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Message::new(SUMMARY_AUTHOR, ""),
    };
    let header = format!(
        "Summary of {} earlier messages ({} to {}):",
        older.len(),
        first.timestamp.format("%Y-%m-%d %H:%M"),
        last.timestamp.format("%Y-%m-%d %H:%M"),
    );

    let lines: Vec<String> = older.iter().map(excerpt).collect();
    let mut skip = 0;
    let body = loop {
        let mut body = header.clone();
        if skip > 0 {
            body.push_str(&format!("\n- ({skip} older messages omitted)"));
        }
        for line in &lines[skip..] {
            body.push('\n');
            body.push_str(line);
        }
        let candidate = Message::new(SUMMARY_AUTHOR, body.as_str());
        if skip == lines.len() || estimate_message_tokens(&candidate) <= available {
            break body;
        }
        skip += 1;
    };

    Message::new(SUMMARY_AUTHOR, body)
        .with_id(format!("summary-{}", last.id))
        .at(last.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn history(n: usize, body_len: usize) -> Vec<Message> {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                Message::new(format!("user{}", i % 3), "x".repeat(body_len))
                    .with_id(format!("m{i:02}"))
                    .at(t0 + Duration::minutes(i as i64))
            })
            .collect()
    }

    #[test]
    fn under_budget_is_untouched() {
        let ctx = ConversationContext::new("sys", history(5, 10));
        assert_eq!(compress(&ctx, 10_000, 2), ctx);
    }

    #[test]
    fn keeps_recent_verbatim_and_folds_the_rest() {
        let ctx = ConversationContext::new("sys", history(30, 200));
        let out = compress(&ctx, 600, 4);

        assert_eq!(out.len(), 5);
        let summary = &out.messages()[0];
        assert_eq!(summary.author_id, SUMMARY_AUTHOR);
        assert_eq!(summary.id, "summary-m25");
        assert!(summary.body.starts_with("Summary of 26 earlier messages (2026-03-01 09:00 to 2026-03-01 09:25):"));

        let tail: Vec<_> = out.messages()[1..].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(tail, vec!["m26", "m27", "m28", "m29"]);
        assert_eq!(out.messages()[1..], ctx.messages()[26..]);
    }

    #[test]
    fn drops_oldest_excerpts_to_fit() {
        let ctx = ConversationContext::new("sys", history(40, 200));
        let out = compress(&ctx, 450, 2);
        let summary = &out.messages()[0];
        assert!(summary.body.contains("older messages omitted"));
        assert!(out.estimated_tokens() <= 450);
    }

    #[test]
    fn placeholder_stays_first_when_timestamps_tie() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let messages = (0..10)
            .map(|i| Message::new("alice", "y".repeat(200)).with_id(format!("m{i}")).at(t))
            .collect();
        let ctx = ConversationContext::new("sys", messages);
        let out = compress(&ctx, 200, 3);

        let ids: Vec<_> = out.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["summary-m6", "m7", "m8", "m9"]);
        let chat = out.to_chat_messages("p-scout");
        assert!(chat[1].content.contains("Summary of 7 earlier messages"));
    }

    #[test]
    fn compression_is_deterministic() {
        let ctx = ConversationContext::new("sys", history(25, 120));
        assert_eq!(compress(&ctx, 300, 3), compress(&ctx, 300, 3));
    }
}
