use crate::merged::{MergedMessage, MergedRole};

/// Place the system prompt into the merged message sequence (step 2).
///
/// Both "only one user message" and "multiple messages, first is user" fold
/// to the same transform: the system text is prefixed onto the first
/// message's text. Only when the conversation opens with an assistant turn
/// does the system prompt need a standalone leading user entry.
pub fn place_system(system: Option<String>, merged: &mut Vec<MergedMessage>) {
    let Some(system) = system else { return };
    if system.is_empty() {
        return;
    }

    match merged.first_mut() {
        Some(first) if first.role == MergedRole::User => {
            first.text = if first.text.is_empty() {
                system
            } else {
                format!("{system}\n\n{}", first.text)
            };
        }
        Some(_) => {
            // First message is assistant: emit system as a standalone
            // leading user entry instead of splicing into it.
            merged.insert(0, MergedMessage::new_user(system));
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_user_message_gets_system_prefixed() {
        let mut merged = vec![MergedMessage::new_user("hi".to_string())];
        place_system(Some("be nice".to_string()), &mut merged);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "be nice\n\nhi");
    }

    #[test]
    fn multiple_messages_still_fold_into_first() {
        let mut merged = vec![
            MergedMessage::new_user("hi".to_string()),
            MergedMessage::new_assistant("hello".to_string()),
        ];
        place_system(Some("be nice".to_string()), &mut merged);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "be nice\n\nhi");
    }

    #[test]
    fn assistant_first_gets_standalone_system_entry() {
        let mut merged = vec![MergedMessage::new_assistant("hello there".to_string())];
        place_system(Some("be nice".to_string()), &mut merged);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].role, MergedRole::User);
        assert_eq!(merged[0].text, "be nice");
        assert_eq!(merged[1].text, "hello there");
    }

    #[test]
    fn no_system_prompt_is_a_no_op() {
        let mut merged = vec![MergedMessage::new_user("hi".to_string())];
        place_system(None, &mut merged);
        assert_eq!(merged[0].text, "hi");
    }
}
