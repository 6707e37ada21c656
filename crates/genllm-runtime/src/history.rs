//! History reconciliation
//!
//! A chat call leaves tool-call and tool-result turns in the transcript.
//! [`reconcile`] drops them so the history handed back to the caller only
//! grows by the turns a user would see.

use genllm_core::{Message, Role};

/// Prune tool traffic from `history`
///
/// - tool-role turns are dropped
/// - user turns that only carry tool results are dropped
/// - assistant turns that call tools keep their text, or are dropped when
///   they have none
///
/// Everything else is kept in order. Reconciling a reconciled history
/// returns it unchanged.
pub fn reconcile(history: Vec<Message>) -> Vec<Message> {
    history.into_iter().filter_map(visible_turn).collect()
}

fn visible_turn(message: Message) -> Option<Message> {
    match message.role {
        Role::Tool => None,
        Role::Assistant if message.has_tool_uses() => text_only(&message).map(Message::assistant),
        Role::User if message.has_tool_results() => text_only(&message).map(Message::user),
        _ => Some(message),
    }
}

fn text_only(message: &Message) -> Option<String> {
    message.text().filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use genllm_core::ContentBlock;
    use serde_json::json;

    fn tool_turns() -> Vec<Message> {
        vec![
            Message::system("Be brief"),
            Message::user("What is 2 + 3?"),
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "c1".into(),
                    name: "add".into(),
                    input: json!({"a": 2, "b": 3}),
                }],
            ),
            Message::tool_result("c1", "{\"result\":5}", false),
            Message::blocks(
                Role::Assistant,
                vec![
                    ContentBlock::Text { text: "Double checking.".into() },
                    ContentBlock::ToolUse {
                        id: "c2".into(),
                        name: "add".into(),
                        input: json!({"a": 3, "b": 2}),
                    },
                ],
            ),
            Message::blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "c2".into(),
                    content: "{\"result\":5}".into(),
                    is_error: false,
                }],
            ),
            Message::assistant("It is 5."),
        ]
    }

    #[test]
    fn test_drops_tool_traffic() {
        let pruned = reconcile(tool_turns());
        assert_eq!(
            pruned,
            vec![
                Message::system("Be brief"),
                Message::user("What is 2 + 3?"),
                Message::assistant("Double checking."),
                Message::assistant("It is 5."),
            ]
        );
    }

    #[test]
    fn test_idempotent() {
        let once = reconcile(tool_turns());
        let twice = reconcile(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_plain_history_untouched() {
        let history = vec![
            Message::user("Hi"),
            Message::assistant(""),
            Message::user("Still there?"),
            Message::assistant("Yes."),
        ];
        assert_eq!(reconcile(history.clone()), history);
    }
}
