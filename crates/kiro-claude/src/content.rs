use serde::{Deserialize, Serialize};

/// A single content block inside a Claude message.
///
/// Internally tagged on `"type"`. Serde's derive rejects any `type` value it
/// doesn't recognize — an unknown block variant is a parse error, not a
/// silently-dropped value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default = "empty_object")]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: ToolResultContent,
        #[serde(default)]
        is_error: bool,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    /// The `<fmt>` half of a `media_type` like `image/png`.
    pub fn format(&self) -> &str {
        self.media_type
            .rsplit('/')
            .next()
            .unwrap_or(&self.media_type)
    }
}

/// A tool result's content is either plain text or a nested block array;
/// both are flattened to text by the translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for ToolResultContent {
    fn default() -> Self {
        ToolResultContent::Text(String::new())
    }
}

impl ToolResultContent {
    /// Flatten to a single string, concatenating any nested text blocks.
    pub fn as_text(&self) -> String {
        match self {
            ToolResultContent::Text(s) => s.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A message's `content` field accepts either a bare string (shorthand for a
/// single text block) or an explicit content-block array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text }],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_content_block_variant() {
        let raw = serde_json::json!({"type": "audio", "data": "x"});
        let result: Result<ContentBlock, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn string_shorthand_becomes_single_text_block() {
        let content: MessageContent = serde_json::from_value(serde_json::json!("hello")).unwrap();
        let blocks = content.into_blocks();
        assert_eq!(blocks.len(), 1);
        matches!(blocks[0], ContentBlock::Text { .. });
    }

    #[test]
    fn image_format_extracted_from_media_type() {
        let src = ImageSource {
            kind: "base64".to_string(),
            media_type: "image/png".to_string(),
            data: "abc".to_string(),
        };
        assert_eq!(src.format(), "png");
    }
}
