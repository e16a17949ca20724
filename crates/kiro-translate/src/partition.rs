use crate::merged::{MergedMessage, MergedRole};

/// History/current partition (step 4). Returns `(history, current)`.
///
/// Ensures history alternates and ends with an assistant entry, injecting a
/// synthetic `"Continue"` assistant turn when it doesn't — this is the same
/// invariant the selector-facing `Account` cooldown logic has nothing to do
/// with; here it's purely about the upstream's alternation requirement.
pub fn partition(mut merged: Vec<MergedMessage>) -> (Vec<MergedMessage>, MergedMessage) {
    let last = merged
        .pop()
        .expect("caller guarantees at least one message");

    let mut history = merged;
    let current = if last.role == MergedRole::Assistant {
        history.push(last);
        MergedMessage::new_user("Continue".to_string())
    } else {
        last
    };

    if matches!(history.last(), Some(m) if m.role == MergedRole::User) {
        history.push(MergedMessage::new_assistant("Continue".to_string()));
    }

    (history, current)
}

/// Empty-content placeholder substitution, by priority: tool results, then
/// images, then a generic continuation marker.
pub fn effective_content(message: &MergedMessage) -> String {
    if !message.text.is_empty() {
        return message.text.clone();
    }
    if !message.tool_results.is_empty() {
        return "Tool results provided.".to_string();
    }
    if !message.images.is_empty() {
        return "Image provided.".to_string();
    }
    "Continue".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merged::ToolResultEntry;

    #[test]
    fn last_assistant_message_becomes_continue_current() {
        let merged = vec![
            MergedMessage::new_user("hi".to_string()),
            MergedMessage::new_assistant("hello".to_string()),
        ];
        let (history, current) = partition(merged);
        assert_eq!(history.len(), 2);
        assert_eq!(current.text, "Continue");
    }

    #[test]
    fn trailing_user_history_gets_synthetic_assistant_continue() {
        let merged = vec![
            MergedMessage::new_user("hi".to_string()),
            MergedMessage::new_assistant("hello".to_string()),
            MergedMessage::new_user("more context".to_string()),
            MergedMessage::new_user("final question".to_string()),
        ];
        let (history, _current) = partition(merged);
        assert_eq!(history.last().unwrap().role, MergedRole::Assistant);
        assert_eq!(history.last().unwrap().text, "Continue");
    }

    #[test]
    fn empty_text_with_tool_results_uses_placeholder() {
        let mut m = MergedMessage::new_user(String::new());
        m.tool_results.push(ToolResultEntry {
            tool_use_id: "t1".to_string(),
            text: "ok".to_string(),
        });
        assert_eq!(effective_content(&m), "Tool results provided.");
    }

    #[test]
    fn empty_text_with_no_content_falls_back_to_continue() {
        let m = MergedMessage::new_user(String::new());
        assert_eq!(effective_content(&m), "Continue");
    }
}
