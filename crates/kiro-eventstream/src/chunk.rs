//! Decodes the JSON payload of an `event`-typed frame into a typed
//! [`UpstreamChunk`]. The wire shape has no explicit discriminant tag — which
//! variant a payload represents is determined by which fields are present —
//! so classification is done by inspecting the parsed [`serde_json::Value`]
//! rather than via `#[serde(tag = ...)]`.

use serde_json::Value;

use crate::error::{EventStreamError, Result};

/// One decoded chunk from an `event`-typed frame's JSON payload (spec.md §3).
/// `Legacy` retains any structured-event shape this gateway doesn't assign a
/// dedicated variant to, for forward compatibility with upstream payloads
/// this translation layer hasn't been taught about yet.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamChunk {
    /// A plain text delta.
    Text { content: String },
    /// A tool-use fragment: an opening `{name, toolUseId}`, a streamed
    /// `input` JSON fragment, or a closing `{stop: true}` — any subset of
    /// these fields may be present on one chunk.
    ToolUse {
        name: Option<String>,
        tool_use_id: Option<String>,
        input: Option<String>,
        stop: bool,
    },
    /// The upstream's running estimate of context-window usage, used to
    /// derive a tighter input-token count (spec.md §4.7).
    ContextUsage { percentage: f64 },
    /// Any other JSON shape — preserved for legacy structured-event
    /// compatibility rather than dropped.
    Legacy(Value),
}

impl UpstreamChunk {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| EventStreamError::InvalidJson(e.to_string()))?;
        Ok(Self::from_value(value))
    }

    fn from_value(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return UpstreamChunk::Legacy(value);
        };

        if let Some(content) = obj.get("content").and_then(Value::as_str) {
            return UpstreamChunk::Text {
                content: content.to_string(),
            };
        }

        if let Some(percentage) = obj.get("contextUsagePercentage").and_then(Value::as_f64) {
            return UpstreamChunk::ContextUsage { percentage };
        }

        let name = obj.get("name").and_then(Value::as_str).map(String::from);
        let tool_use_id = obj
            .get("toolUseId")
            .and_then(Value::as_str)
            .map(String::from);
        let input = obj.get("input").and_then(Value::as_str).map(String::from);
        let stop = obj.get("stop").and_then(Value::as_bool).unwrap_or(false);

        if name.is_some() || tool_use_id.is_some() || input.is_some() || stop {
            return UpstreamChunk::ToolUse {
                name,
                tool_use_id,
                input,
                stop,
            };
        }

        UpstreamChunk::Legacy(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_chunk() {
        let chunk = UpstreamChunk::parse(br#"{"content":"hello"}"#).unwrap();
        assert_eq!(
            chunk,
            UpstreamChunk::Text {
                content: "hello".to_string()
            }
        );
    }

    #[test]
    fn tool_use_opening_chunk() {
        let chunk =
            UpstreamChunk::parse(br#"{"name":"search","toolUseId":"t1"}"#).unwrap();
        assert_eq!(
            chunk,
            UpstreamChunk::ToolUse {
                name: Some("search".to_string()),
                tool_use_id: Some("t1".to_string()),
                input: None,
                stop: false,
            }
        );
    }

    #[test]
    fn tool_use_input_fragment_chunk() {
        let chunk = UpstreamChunk::parse(br#"{"input":"{\"q\":"}"#).unwrap();
        assert!(matches!(chunk, UpstreamChunk::ToolUse { input: Some(_), .. }));
    }

    #[test]
    fn tool_use_stop_only_chunk() {
        let chunk = UpstreamChunk::parse(br#"{"stop":true}"#).unwrap();
        assert_eq!(
            chunk,
            UpstreamChunk::ToolUse {
                name: None,
                tool_use_id: None,
                input: None,
                stop: true,
            }
        );
    }

    #[test]
    fn context_usage_chunk() {
        let chunk = UpstreamChunk::parse(br#"{"contextUsagePercentage":0.1}"#).unwrap();
        assert_eq!(chunk, UpstreamChunk::ContextUsage { percentage: 0.1 });
    }

    #[test]
    fn unrecognized_shape_falls_back_to_legacy() {
        let chunk = UpstreamChunk::parse(br#"{"followupPrompt":{"text":"x"}}"#).unwrap();
        assert!(matches!(chunk, UpstreamChunk::Legacy(_)));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(UpstreamChunk::parse(b"not json").is_err());
    }
}
