use std::collections::HashSet;

use crate::envelope::{Envelope, HistoryEntry, UserInputMessageContext};
use crate::tools::UpstreamTool;

/// Tools-injection retry (step 7). On an upstream `400 Improperly formed
/// request`, walk `history` for every tool name referenced by a tool-use and
/// inject a synthetic minimal tool definition (empty-object schema) for each
/// into the current message's `userInputMessageContext.tools`.
///
/// Idempotent: applying this twice to the same envelope injects nothing new
/// the second time, since the names already present are skipped.
pub fn inject_tools_from_history(envelope: &mut Envelope) {
    let mut referenced_names: HashSet<String> = HashSet::new();
    if let Some(history) = &envelope.conversation_state.history {
        for entry in history {
            if let HistoryEntry::Assistant {
                assistant_response_message,
            } = entry
            {
                if let Some(tool_uses) = &assistant_response_message.tool_uses {
                    for tool_use in tool_uses {
                        referenced_names.insert(tool_use.name.clone());
                    }
                }
            }
        }
    }

    if referenced_names.is_empty() {
        return;
    }

    let context = envelope
        .conversation_state
        .current_message
        .user_input_message
        .user_input_message_context
        .get_or_insert_with(UserInputMessageContext::default);

    let existing: HashSet<String> = context
        .tools
        .iter()
        .flatten()
        .map(|t| t.tool_specification.name.clone())
        .collect();

    let mut to_add: Vec<UpstreamTool> = referenced_names
        .into_iter()
        .filter(|name| !existing.contains(name))
        .map(synthetic_tool)
        .collect();

    if to_add.is_empty() {
        return;
    }

    to_add.sort_by(|a, b| a.tool_specification.name.cmp(&b.tool_specification.name));
    context.tools.get_or_insert_with(Vec::new).extend(to_add);
}

fn synthetic_tool(name: String) -> UpstreamTool {
    use crate::tools::{InputSchemaWrapper, ToolSpecification};
    UpstreamTool {
        tool_specification: ToolSpecification {
            name,
            description: String::new(),
            input_schema: InputSchemaWrapper {
                json: serde_json::json!({}),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::build_envelope;
    use crate::merged::{MergedMessage, ToolUseEntry};
    use kiro_core::types::{Account, AuthMethod};

    fn account() -> Account {
        Account {
            uuid: "u1".to_string(),
            region: "us-east-1".to_string(),
            profile_arn: "arn:aws:codewhisperer:us-east-1:123:profile/p1".to_string(),
            auth_method: AuthMethod::Social,
            is_healthy: true,
            is_disabled: false,
            last_error_time: None,
            scheduled_recovery_time: None,
            usage_count: 0,
            error_count: 0,
        }
    }

    fn envelope_with_tool_use() -> Envelope {
        let mut assistant = MergedMessage::new_assistant(String::new());
        assistant.tool_uses.push(ToolUseEntry {
            id: "t1".to_string(),
            name: "search".to_string(),
            input: serde_json::json!({"q": "rust"}),
        });
        let history = vec![MergedMessage::new_user("hi".to_string()), assistant];
        let current = MergedMessage::new_user("more".to_string());
        build_envelope(&account(), "m", &history, &current, vec![])
    }

    #[test]
    fn injects_synthetic_tool_for_referenced_name() {
        let mut envelope = envelope_with_tool_use();
        inject_tools_from_history(&mut envelope);
        let tools = envelope
            .conversation_state
            .current_message
            .user_input_message
            .user_input_message_context
            .as_ref()
            .unwrap()
            .tools
            .as_ref()
            .unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tool_specification.name, "search");
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let mut envelope = envelope_with_tool_use();
        inject_tools_from_history(&mut envelope);
        inject_tools_from_history(&mut envelope);
        let tools = envelope
            .conversation_state
            .current_message
            .user_input_message
            .user_input_message_context
            .as_ref()
            .unwrap()
            .tools
            .as_ref()
            .unwrap();
        assert_eq!(tools.len(), 1);
    }

    #[test]
    fn no_history_tool_uses_is_a_no_op() {
        let current = MergedMessage::new_user("hi".to_string());
        let mut envelope = build_envelope(&account(), "m", &[], &current, vec![]);
        inject_tools_from_history(&mut envelope);
        assert!(envelope
            .conversation_state
            .current_message
            .user_input_message
            .user_input_message_context
            .is_none());
    }
}
