//! Bounds the conversation view sent to the model
//!
//! The conversation itself is never truncated. When a token budget is set,
//! each request carries the initial user message, a short note saying how
//! much was left out, and the most recent messages that fit the budget.

use reel_ai::{Content, Message};

/// Estimate token count for a single message (chars/4 heuristic)
pub fn estimate_tokens(message: &Message) -> u32 {
    let char_count: usize = message
        .content()
        .iter()
        .map(|c| match c {
            Content::Text { text } => text.len(),
            Content::ToolCall {
                name, arguments, ..
            } => name.len() + serde_json::to_string(arguments).unwrap_or_default().len(),
        })
        .sum();
    (char_count / 4) as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Token budget for recent messages; `None` sends everything
    pub keep_recent_tokens: Option<u32>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn keep_recent(tokens: u32) -> Self {
        Self {
            keep_recent_tokens: Some(tokens),
        }
    }

    /// Build the message list for the next request
    pub fn view(&self, messages: &[Message]) -> Vec<Message> {
        let Some(budget) = self.keep_recent_tokens else {
            return messages.to_vec();
        };
        let Some(first_kept) = find_cut_point(messages, budget) else {
            return messages.to_vec();
        };

        let omitted = first_kept - 1;
        tracing::debug!(omitted, first_kept, "trimming conversation view");

        let mut view = Vec::with_capacity(messages.len() - omitted + 1);
        view.push(messages[0].clone());
        view.push(Message::user(format!(
            "[{} earlier message{} omitted to save context. The conversation continues below.]",
            omitted,
            if omitted == 1 { "" } else { "s" }
        )));
        view.extend_from_slice(&messages[first_kept..]);
        view
    }
}

/// Index of the first recent message to keep, or `None` when nothing needs cutting.
/// Walks backwards until `keep_recent_tokens` is reached, then moves forward to a
/// user or assistant message so tool results always follow their call.
fn find_cut_point(messages: &[Message], keep_recent_tokens: u32) -> Option<usize> {
    if messages.len() < 3 {
        return None;
    }

    let mut accumulated: u32 = 0;
    let mut cut_index = None;
    for i in (1..messages.len()).rev() {
        accumulated += estimate_tokens(&messages[i]);
        if accumulated > keep_recent_tokens {
            cut_index = Some(i + 1);
            break;
        }
    }
    let mut first_kept = cut_index?;

    // Always keep the latest message
    first_kept = first_kept.min(messages.len() - 1);

    while first_kept < messages.len() {
        match &messages[first_kept] {
            Message::User { .. } | Message::Assistant { .. } => break,
            Message::ToolResult { .. } => first_kept += 1,
        }
    }

    if first_kept >= messages.len() {
        // Only tool results remain ahead; walk back to the call that produced them
        let mut back = messages.len() - 1;
        while back > 1 && matches!(messages[back], Message::ToolResult { .. }) {
            back -= 1;
        }
        if back <= 1 {
            return None;
        }
        return Some(back);
    }
    Some(first_kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_msg(text: &str) -> Message {
        Message::user(text)
    }

    fn assistant_call(id: &str) -> Message {
        Message::assistant(vec![Content::tool_call(
            id,
            "run_manim_code",
            json!({"reasoning": "r", "manim_code": "x".repeat(40), "scene_name": "S"}),
        )])
    }

    fn tool_result_msg(id: &str, text: &str) -> Message {
        Message::tool_result(id, "run_manim_code", vec![Content::text(text)], true)
    }

    fn long_history(turns: usize) -> Vec<Message> {
        let mut messages = vec![user_msg("Create a Manim scene of a red circle")];
        for i in 0..turns {
            let id = format!("call_{}", i);
            messages.push(assistant_call(&id));
            messages.push(tool_result_msg(&id, &"E".repeat(400)));
        }
        messages
    }

    #[test]
    fn test_estimate_tokens_text() {
        assert_eq!(estimate_tokens(&user_msg(&"a".repeat(400))), 100);
    }

    #[test]
    fn test_unbounded_view_is_identity() {
        let messages = long_history(5);
        assert_eq!(RetentionPolicy::unbounded().view(&messages).len(), messages.len());
    }

    #[test]
    fn test_small_history_is_not_cut() {
        let messages = long_history(1);
        let view = RetentionPolicy::keep_recent(10_000).view(&messages);
        assert_eq!(view.len(), messages.len());
    }

    #[test]
    fn test_view_keeps_first_message_and_adds_note() {
        let messages = long_history(10);
        let view = RetentionPolicy::keep_recent(250).view(&messages);
        assert!(view.len() < messages.len());
        assert_eq!(view[0].text(), "Create a Manim scene of a red circle");
        assert!(view[1].text().contains("omitted"));
        // The latest result is always present
        assert_eq!(view.last().map(|m| m.text()), messages.last().map(|m| m.text()));
    }

    #[test]
    fn test_view_never_starts_recent_part_on_tool_result() {
        let messages = long_history(10);
        for budget in [50, 100, 150, 200, 300, 500] {
            let view = RetentionPolicy::keep_recent(budget).view(&messages);
            if view.len() < messages.len() {
                assert!(
                    !matches!(view[2], Message::ToolResult { .. }),
                    "budget {} started on a tool result",
                    budget
                );
            }
        }
    }

    #[test]
    fn test_conversation_is_untouched() {
        let messages = long_history(10);
        let before = messages.len();
        let _ = RetentionPolicy::keep_recent(100).view(&messages);
        assert_eq!(messages.len(), before);
    }
}
