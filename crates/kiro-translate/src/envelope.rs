use kiro_core::types::Account;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::merged::{MergedMessage, MergedRole};
use crate::partition::effective_content;
use crate::tools::UpstreamTool;

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "conversationState")]
    pub conversation_state: ConversationState,
    #[serde(rename = "profileArn")]
    pub profile_arn: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    #[serde(rename = "chatTriggerType")]
    pub chat_trigger_type: &'static str,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    #[serde(rename = "currentMessage")]
    pub current_message: CurrentMessage,
    #[serde(rename = "history", skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentMessage {
    #[serde(rename = "userInputMessage")]
    pub user_input_message: UserInputMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInputMessage {
    pub content: String,
    #[serde(rename = "modelId", skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub origin: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<UpstreamImage>>,
    #[serde(rename = "userInputMessageContext", skip_serializing_if = "Option::is_none")]
    pub user_input_message_context: Option<UserInputMessageContext>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct UserInputMessageContext {
    #[serde(rename = "toolResults", skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<UpstreamToolResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<UpstreamTool>>,
}

impl UserInputMessageContext {
    fn is_empty(&self) -> bool {
        self.tool_results.is_none() && self.tools.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HistoryEntry {
    User {
        #[serde(rename = "userInputMessage")]
        user_input_message: UserInputMessage,
    },
    Assistant {
        #[serde(rename = "assistantResponseMessage")]
        assistant_response_message: AssistantResponseMessage,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantResponseMessage {
    pub content: String,
    #[serde(rename = "toolUses", skip_serializing_if = "Option::is_none")]
    pub tool_uses: Option<Vec<UpstreamToolUse>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamToolUse {
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamToolResult {
    #[serde(rename = "toolUseId")]
    pub tool_use_id: String,
    pub content: Vec<UpstreamToolResultContent>,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamToolResultContent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamImage {
    pub format: String,
    pub source: UpstreamImageSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamImageSource {
    pub bytes: String,
}

/// Build the final upstream envelope (step 6) from the already-merged,
/// system-placed, orphan-filtered, history/current-partitioned messages and
/// the already-converted tool definitions.
///
/// Must be marshaled without HTML-escaping `<`, `>`, `&` — `serde_json`
/// doesn't escape these by default, so no extra handling is needed here.
pub fn build_envelope(
    account: &Account,
    model_id: &str,
    history: &[MergedMessage],
    current: &MergedMessage,
    tools: Vec<UpstreamTool>,
) -> Envelope {
    let history_entries: Vec<HistoryEntry> = history.iter().map(to_history_entry).collect();

    let current_context = UserInputMessageContext {
        tool_results: to_tool_results(current),
        tools: if tools.is_empty() { None } else { Some(tools) },
    };

    let current_message = CurrentMessage {
        user_input_message: UserInputMessage {
            content: effective_content(current),
            model_id: Some(model_id.to_string()),
            origin: "AI_EDITOR",
            images: to_images(current),
            user_input_message_context: if current_context.is_empty() {
                None
            } else {
                Some(current_context)
            },
        },
    };

    Envelope {
        conversation_state: ConversationState {
            chat_trigger_type: "MANUAL",
            conversation_id: Uuid::new_v4().to_string(),
            current_message,
            history: if history_entries.is_empty() {
                None
            } else {
                Some(history_entries)
            },
        },
        profile_arn: account.profile_arn.clone(),
    }
}

fn to_history_entry(message: &MergedMessage) -> HistoryEntry {
    match message.role {
        MergedRole::User => HistoryEntry::User {
            user_input_message: UserInputMessage {
                content: effective_content(message),
                model_id: None,
                origin: "AI_EDITOR",
                images: to_images(message),
                user_input_message_context: to_tool_results(message).map(|tool_results| {
                    UserInputMessageContext {
                        tool_results: Some(tool_results),
                        tools: None,
                    }
                }),
            },
        },
        MergedRole::Assistant => HistoryEntry::Assistant {
            assistant_response_message: AssistantResponseMessage {
                content: effective_content(message),
                tool_uses: to_tool_uses(message),
            },
        },
    }
}

fn to_images(message: &MergedMessage) -> Option<Vec<UpstreamImage>> {
    if message.images.is_empty() {
        return None;
    }
    Some(
        message
            .images
            .iter()
            .map(|img| UpstreamImage {
                format: img.format.clone(),
                source: UpstreamImageSource {
                    bytes: img.bytes.clone(),
                },
            })
            .collect(),
    )
}

fn to_tool_results(message: &MergedMessage) -> Option<Vec<UpstreamToolResult>> {
    if message.tool_results.is_empty() {
        return None;
    }
    Some(
        message
            .tool_results
            .iter()
            .map(|tr| UpstreamToolResult {
                tool_use_id: tr.tool_use_id.clone(),
                content: vec![UpstreamToolResultContent {
                    text: tr.text.clone(),
                }],
                status: "success",
            })
            .collect(),
    )
}

fn to_tool_uses(message: &MergedMessage) -> Option<Vec<UpstreamToolUse>> {
    if message.tool_uses.is_empty() {
        return None;
    }
    Some(
        message
            .tool_uses
            .iter()
            .map(|tu| UpstreamToolUse {
                tool_use_id: tu.id.clone(),
                name: tu.name.clone(),
                input: tu.input.clone(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merged::ToolUseEntry;
    use kiro_core::types::AuthMethod;

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

    #[test]
    fn current_message_content_is_non_empty() {
        let current = MergedMessage::new_user("hello".to_string());
        let envelope = build_envelope(&account(), "CLAUDE_SONNET_4_5_20250929_V1_0", &[], &current, vec![]);
        assert_eq!(
            envelope.conversation_state.current_message.user_input_message.content,
            "hello"
        );
        assert!(envelope.conversation_state.history.is_none());
    }

    #[test]
    fn empty_history_is_omitted_not_empty_array() {
        let current = MergedMessage::new_user("hi".to_string());
        let envelope = build_envelope(&account(), "m", &[], &current, vec![]);
        assert!(envelope.conversation_state.history.is_none());
    }

    #[test]
    fn history_entries_map_to_correct_variant() {
        let history = vec![
            MergedMessage::new_user("hi".to_string()),
            MergedMessage::new_assistant("hello".to_string()),
        ];
        let current = MergedMessage::new_user("more".to_string());
        let envelope = build_envelope(&account(), "m", &history, &current, vec![]);
        let entries = envelope.conversation_state.history.unwrap();
        assert!(matches!(entries[0], HistoryEntry::User { .. }));
        assert!(matches!(entries[1], HistoryEntry::Assistant { .. }));
    }

    #[test]
    fn tool_uses_carried_onto_assistant_history_entry() {
        let mut assistant = MergedMessage::new_assistant(String::new());
        assistant.tool_uses.push(ToolUseEntry {
            id: "t1".to_string(),
            name: "search".to_string(),
            input: serde_json::json!({"q": "rust"}),
        });
        let history = vec![MergedMessage::new_user("hi".to_string()), assistant];
        let current = MergedMessage::new_user("more".to_string());
        let envelope = build_envelope(&account(), "m", &history, &current, vec![]);
        match &envelope.conversation_state.history.unwrap()[1] {
            HistoryEntry::Assistant {
                assistant_response_message,
            } => {
                let tool_uses = assistant_response_message.tool_uses.as_ref().unwrap();
                assert_eq!(tool_uses[0].tool_use_id, "t1");
            }
            _ => panic!("expected assistant entry"),
        }
    }
}
