use serde::Serialize;

use crate::response::Usage;

/// A partial `MessageResponse`-shaped payload attached to `message_start` —
/// Claude echoes the message envelope with empty `content` and only the
/// input half of usage filled in at that point.
#[derive(Debug, Clone, Serialize)]
pub struct MessageStartPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<()>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

impl MessageStartPayload {
    pub fn new(id: String, model: String, input_tokens: u64) -> Self {
        Self {
            id,
            kind: "message".to_string(),
            role: "assistant".to_string(),
            content: Vec::new(),
            model,
            stop_reason: None,
            stop_sequence: None,
            usage: Usage {
                input_tokens,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageDeltaFields {
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
}

/// One Claude-format server-sent event. Serializes (via the `type` tag) to
/// exactly the JSON shape emitted in the `data:` line; the SSE `event:` line
/// is the same tag value, written out separately by the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeSseEvent {
    MessageStart { message: MessageStartPayload },
    ContentBlockStart { index: u32, content_block: ContentBlockStart },
    ContentBlockDelta { index: u32, delta: Delta },
    ContentBlockStop { index: u32 },
    MessageDelta { delta: MessageDeltaFields, usage: Usage },
    MessageStop,
    Ping,
    Error { error: ErrorPayload },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ClaudeSseEvent {
    /// The SSE `event:` line value — the same name the payload tags itself
    /// with under `type`.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClaudeSseEvent::MessageStart { .. } => "message_start",
            ClaudeSseEvent::ContentBlockStart { .. } => "content_block_start",
            ClaudeSseEvent::ContentBlockDelta { .. } => "content_block_delta",
            ClaudeSseEvent::ContentBlockStop { .. } => "content_block_stop",
            ClaudeSseEvent::MessageDelta { .. } => "message_delta",
            ClaudeSseEvent::MessageStop => "message_stop",
            ClaudeSseEvent::Ping => "ping",
            ClaudeSseEvent::Error { .. } => "error",
        }
    }

    /// Render as the two-line SSE frame body (without the trailing blank
    /// line, which the transport layer appends once per event).
    pub fn to_sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }
}
