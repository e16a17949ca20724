use std::collections::{HashMap, HashSet};

use crate::merged::MergedMessage;

/// Two-pass orphan filtering (step 3, the variant that produces strictly
/// fewer upstream-rejected envelopes than the parse-time filter).
///
/// `tools_with_required_params` maps a tool name to whether its schema
/// declares at least one required parameter.
pub fn filter_orphans(
    merged: &mut [MergedMessage],
    tools_with_required_params: &HashMap<String, bool>,
) {
    let referenced: HashSet<String> = merged
        .iter()
        .flat_map(|m| m.tool_results.iter().map(|tr| tr.tool_use_id.clone()))
        .collect();

    let mut removed: HashSet<String> = HashSet::new();

    for message in merged.iter_mut() {
        message.tool_uses.retain(|tool_use| {
            let empty_input = tool_use
                .input
                .as_object()
                .map(|o| o.is_empty())
                .unwrap_or(false);
            let has_required = tools_with_required_params
                .get(&tool_use.name)
                .copied()
                .unwrap_or(false);

            if empty_input && has_required {
                removed.insert(tool_use.id.clone());
                return false;
            }
            if !referenced.contains(&tool_use.id) {
                removed.insert(tool_use.id.clone());
                return false;
            }
            true
        });
    }

    for message in merged.iter_mut() {
        message
            .tool_results
            .retain(|tr| !removed.contains(&tr.tool_use_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merged::{MergedMessage, ToolResultEntry, ToolUseEntry};

    #[test]
    fn orphan_tool_use_with_empty_required_input_is_dropped() {
        let mut merged = vec![MergedMessage {
            tool_uses: vec![ToolUseEntry {
                id: "T1".to_string(),
                name: "AskUserQuestion".to_string(),
                input: serde_json::json!({}),
            }],
            ..MergedMessage::new_assistant(String::new())
        }];
        let mut required = HashMap::new();
        required.insert("AskUserQuestion".to_string(), true);

        filter_orphans(&mut merged, &required);
        assert!(merged[0].tool_uses.is_empty());
    }

    #[test]
    fn tool_use_and_result_both_removed_when_id_dropped() {
        let mut merged = vec![
            MergedMessage {
                tool_uses: vec![ToolUseEntry {
                    id: "T2".to_string(),
                    name: "AskUserQuestion".to_string(),
                    input: serde_json::json!({}),
                }],
                ..MergedMessage::new_assistant(String::new())
            },
            MergedMessage {
                tool_results: vec![ToolResultEntry {
                    tool_use_id: "T2".to_string(),
                    text: "answer".to_string(),
                }],
                ..MergedMessage::new_user(String::new())
            },
        ];
        let mut required = HashMap::new();
        required.insert("AskUserQuestion".to_string(), true);

        filter_orphans(&mut merged, &required);
        assert!(merged[0].tool_uses.is_empty());
        assert!(merged[1].tool_results.is_empty());
    }

    #[test]
    fn referenced_tool_use_with_non_empty_input_survives() {
        let mut merged = vec![
            MergedMessage {
                tool_uses: vec![ToolUseEntry {
                    id: "T3".to_string(),
                    name: "search".to_string(),
                    input: serde_json::json!({"q": "rust"}),
                }],
                ..MergedMessage::new_assistant(String::new())
            },
            MergedMessage {
                tool_results: vec![ToolResultEntry {
                    tool_use_id: "T3".to_string(),
                    text: "results".to_string(),
                }],
                ..MergedMessage::new_user(String::new())
            },
        ];
        filter_orphans(&mut merged, &HashMap::new());
        assert_eq!(merged[0].tool_uses.len(), 1);
        assert_eq!(merged[1].tool_results.len(), 1);
    }
}
