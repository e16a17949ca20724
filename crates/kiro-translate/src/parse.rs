use kiro_claude::content::ContentBlock;
use kiro_claude::request::{Message, MessageContent, Role};

use crate::merged::{ImageEntry, MergedMessage, ToolResultEntry, ToolUseEntry};

const THINKING_OPEN: &str = "<kiro_thinking>";
const THINKING_CLOSE: &str = "</kiro_thinking>";

struct ToolUseAccumulator {
    id: String,
    name: String,
    fragments: Vec<String>,
    direct: Option<serde_json::Value>,
}

/// Parse and merge the Claude message array into the translator's
/// intermediate `MergedMessage` sequence (spec steps 1, 1a, 1b).
pub fn parse_and_merge(messages: &[Message]) -> Vec<MergedMessage> {
    let mut merged: Vec<MergedMessage> = Vec::new();

    for message in messages {
        let next = match message.role {
            Role::User => parse_user_message(message),
            Role::Assistant => parse_assistant_message(message),
        };

        match merged.last_mut() {
            Some(last) if same_role(last, message.role) => last.merge(next),
            _ => merged.push(next),
        }
    }

    merged
}

fn same_role(last: &MergedMessage, role: Role) -> bool {
    matches!(
        (last.role, role),
        (crate::merged::MergedRole::User, Role::User)
            | (crate::merged::MergedRole::Assistant, Role::Assistant)
    )
}

fn parse_user_message(message: &Message) -> MergedMessage {
    let blocks = clone_blocks(&message.content);
    let mut text = String::new();
    let mut tool_results = Vec::new();
    let mut images = Vec::new();
    let mut seen_tool_use_ids = std::collections::HashSet::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => push_text(&mut text, &t),
            ContentBlock::Image { source } => images.push(ImageEntry {
                format: source.format().to_string(),
                bytes: source.data,
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                // Duplicate tool-results (same toolUseId) are deduplicated
                // within a message; status is always "success".
                if seen_tool_use_ids.insert(tool_use_id.clone()) {
                    tool_results.push(ToolResultEntry {
                        tool_use_id,
                        text: content.as_text(),
                    });
                }
            }
            ContentBlock::ToolUse { .. } | ContentBlock::Thinking { .. } => {}
        }
    }

    MergedMessage {
        role: crate::merged::MergedRole::User,
        text,
        tool_results,
        tool_uses: Vec::new(),
        images,
        thinking: String::new(),
    }
}

fn parse_assistant_message(message: &Message) -> MergedMessage {
    let blocks = clone_blocks(&message.content);
    let mut text = String::new();
    let mut thinking = String::new();
    let mut accumulators: Vec<ToolUseAccumulator> = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => push_text(&mut text, &t),
            ContentBlock::Thinking { thinking: t, .. } => push_text(&mut thinking, &t),
            ContentBlock::ToolUse { id, name, input } => {
                accumulate_tool_use(&mut accumulators, id, name, input);
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    let tool_uses = accumulators
        .into_iter()
        .map(finalize_tool_use)
        .collect::<Vec<_>>();

    if !thinking.is_empty() {
        text = format!("{THINKING_OPEN}{thinking}{THINKING_CLOSE}\n\n{text}");
    }

    MergedMessage {
        role: crate::merged::MergedRole::Assistant,
        text,
        tool_results: Vec::new(),
        tool_uses,
        images: Vec::new(),
        thinking,
    }
}

/// Fragmented tool-use reassembly (step 1a): a block whose input is exactly
/// `{"raw_arguments": "<fragment>"}` contributes a fragment to the id's
/// accumulator instead of being treated as a complete tool-use entry.
fn accumulate_tool_use(
    accumulators: &mut Vec<ToolUseAccumulator>,
    id: String,
    name: String,
    input: serde_json::Value,
) {
    let fragment = input
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.get("raw_arguments"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let existing = accumulators.iter_mut().find(|acc| acc.id == id);
    match (existing, fragment) {
        (Some(acc), Some(frag)) => acc.fragments.push(frag),
        (Some(acc), None) => {
            if acc.direct.is_none() && acc.fragments.is_empty() {
                acc.direct = Some(input);
            }
        }
        (None, Some(frag)) => accumulators.push(ToolUseAccumulator {
            id,
            name,
            fragments: vec![frag],
            direct: None,
        }),
        (None, None) => accumulators.push(ToolUseAccumulator {
            id,
            name,
            fragments: Vec::new(),
            direct: Some(input),
        }),
    }
}

fn finalize_tool_use(acc: ToolUseAccumulator) -> ToolUseEntry {
    let input = if !acc.fragments.is_empty() {
        let joined = acc.fragments.join("");
        serde_json::from_str(&joined).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        acc.direct.unwrap_or_else(|| serde_json::json!({}))
    };
    ToolUseEntry {
        id: acc.id,
        name: acc.name,
        input,
    }
}

fn push_text(dest: &mut String, addition: &str) {
    if addition.is_empty() {
        return;
    }
    if dest.is_empty() {
        dest.push_str(addition);
    } else {
        dest.push('\n');
        dest.push_str(addition);
    }
}

fn clone_blocks(content: &MessageContent) -> Vec<ContentBlock> {
    content.clone().into_blocks()
}
