//! Streaming half of C7: folds a chunk stream into Claude SSE events,
//! one [`ClaudeSseEvent`] at a time, per spec.md §4.7 and the ordering
//! invariants in §5/§8.

use kiro_claude::response::{Usage, STOP_REASON_END_TURN, STOP_REASON_TOOL_USE};
use kiro_claude::sse::{
    ClaudeSseEvent, ContentBlockStart, Delta, MessageDeltaFields, MessageStartPayload,
};
use kiro_claude::tokens::{derive_input_tokens, distribute, estimate_tokens};
use kiro_eventstream::UpstreamChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

struct OpenBlock {
    index: u32,
    kind: BlockKind,
}

/// A stateful per-request converter. One instance is owned exclusively by
/// the request handling its response.
pub struct Converter {
    message_id: String,
    model: String,
    input_tokens_estimate: u64,
    message_start_emitted: bool,
    message_delta_emitted: bool,
    open_block: Option<OpenBlock>,
    next_index: u32,
    any_tool_use: bool,
    content_delivered: bool,
    output_chars: usize,
    final_input_tokens: Option<u64>,
}

impl Converter {
    pub fn new(message_id: String, model: String, input_tokens_estimate: u64) -> Self {
        Self {
            message_id,
            model,
            input_tokens_estimate,
            message_start_emitted: false,
            message_delta_emitted: false,
            open_block: None,
            next_index: 0,
            any_tool_use: false,
            content_delivered: false,
            output_chars: 0,
            final_input_tokens: None,
        }
    }

    /// Whether any content has reached the client yet — the signal the
    /// handler uses for the "ghost exception" classification (spec.md §4.7).
    pub fn content_delivered(&self) -> bool {
        self.content_delivered
    }

    /// Fold one decoded upstream chunk into zero or more SSE events.
    pub fn handle_chunk(&mut self, chunk: &UpstreamChunk) -> Vec<ClaudeSseEvent> {
        match chunk {
            UpstreamChunk::Text { content } => self.handle_text(content),
            UpstreamChunk::ToolUse {
                name,
                tool_use_id,
                input,
                stop,
            } => self.handle_tool_use(name.as_deref(), tool_use_id.as_deref(), input.as_deref(), *stop),
            UpstreamChunk::ContextUsage { percentage } => {
                let output_estimate = estimate_tokens(&" ".repeat(self.output_chars));
                self.final_input_tokens = Some(derive_input_tokens(
                    *percentage,
                    output_estimate,
                    self.input_tokens_estimate,
                ));
                Vec::new()
            }
            UpstreamChunk::Legacy(_) => Vec::new(),
        }
    }

    fn handle_text(&mut self, content: &str) -> Vec<ClaudeSseEvent> {
        if content.is_empty() {
            return Vec::new();
        }
        let mut events = self.ensure_message_start();
        events.extend(self.ensure_open_block(BlockKind::Text, None, None));
        events.push(ClaudeSseEvent::ContentBlockDelta {
            index: self.open_block.as_ref().unwrap().index,
            delta: Delta::TextDelta {
                text: content.to_string(),
            },
        });
        self.output_chars += content.chars().count();
        self.content_delivered = true;
        events
    }

    fn handle_tool_use(
        &mut self,
        name: Option<&str>,
        tool_use_id: Option<&str>,
        input: Option<&str>,
        stop: bool,
    ) -> Vec<ClaudeSseEvent> {
        let mut events = Vec::new();

        if name.is_some() || tool_use_id.is_some() {
            events.extend(self.ensure_message_start());
            events.extend(self.ensure_open_block(BlockKind::ToolUse, name, tool_use_id));
            self.any_tool_use = true;
            self.content_delivered = true;
        }

        if let Some(partial) = input {
            if !partial.is_empty() {
                events.extend(self.ensure_message_start());
                if let Some(ob) = &self.open_block {
                    events.push(ClaudeSseEvent::ContentBlockDelta {
                        index: ob.index,
                        delta: Delta::InputJsonDelta {
                            partial_json: partial.to_string(),
                        },
                    });
                    self.output_chars += partial.chars().count();
                    self.content_delivered = true;
                }
            }
        }

        if stop {
            if let Some(ob) = self.open_block.take() {
                events.push(ClaudeSseEvent::ContentBlockStop { index: ob.index });
            }
        }

        events
    }

    fn ensure_message_start(&mut self) -> Vec<ClaudeSseEvent> {
        if self.message_start_emitted {
            return Vec::new();
        }
        self.message_start_emitted = true;
        vec![ClaudeSseEvent::MessageStart {
            message: MessageStartPayload::new(
                self.message_id.clone(),
                self.model.clone(),
                self.input_tokens_estimate,
            ),
        }]
    }

    /// Close the currently open block if it's a different kind, then open a
    /// fresh block of `kind` if none is open.
    fn ensure_open_block(
        &mut self,
        kind: BlockKind,
        name: Option<&str>,
        tool_use_id: Option<&str>,
    ) -> Vec<ClaudeSseEvent> {
        let mut events = Vec::new();

        if let Some(ob) = &self.open_block {
            if ob.kind == kind && kind == BlockKind::Text {
                return events;
            }
            events.push(ClaudeSseEvent::ContentBlockStop { index: ob.index });
            self.open_block = None;
        }

        let index = self.next_index;
        self.next_index += 1;
        let content_block = match kind {
            BlockKind::Text => ContentBlockStart::Text {
                text: String::new(),
            },
            BlockKind::ToolUse => ContentBlockStart::ToolUse {
                id: tool_use_id.unwrap_or_default().to_string(),
                name: name.unwrap_or_default().to_string(),
                input: serde_json::json!({}),
            },
        };
        events.push(ClaudeSseEvent::ContentBlockStart {
            index,
            content_block,
        });
        self.open_block = Some(OpenBlock { index, kind });
        events
    }

    /// Flush terminal SSE events: close any still-open block, emit the one
    /// allowed `message_delta`, then `message_stop`. Safe to call once the
    /// stream ends normally, on a ghost exception, or on cancellation — all
    /// three close out the same way (spec.md §5, §4.7).
    pub fn finish(&mut self) -> Vec<ClaudeSseEvent> {
        if !self.message_start_emitted {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(ob) = self.open_block.take() {
            events.push(ClaudeSseEvent::ContentBlockStop { index: ob.index });
        }

        if !self.message_delta_emitted {
            self.message_delta_emitted = true;
            let output_tokens = estimate_tokens(&" ".repeat(self.output_chars));
            let input_tokens = self.final_input_tokens.unwrap_or(self.input_tokens_estimate);
            let (input, creation, read) = distribute(input_tokens);
            let stop_reason = if self.any_tool_use {
                STOP_REASON_TOOL_USE
            } else {
                STOP_REASON_END_TURN
            };
            events.push(ClaudeSseEvent::MessageDelta {
                delta: MessageDeltaFields {
                    stop_reason: Some(stop_reason.to_string()),
                    stop_sequence: None,
                },
                usage: Usage {
                    input_tokens: input,
                    output_tokens,
                    cache_creation_input_tokens: creation,
                    cache_read_input_tokens: read,
                },
            });
            events.push(ClaudeSseEvent::MessageStop);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> UpstreamChunk {
        UpstreamChunk::Text {
            content: content.to_string(),
        }
    }

    #[test]
    fn s1_simple_streaming_emits_expected_event_order() {
        let mut converter = Converter::new("msg_1".to_string(), "claude-sonnet-4-5".to_string(), 10);

        let mut events = converter.handle_chunk(&text("Hello"));
        events.extend(converter.handle_chunk(&text(" world")));
        events.extend(converter.handle_chunk(&UpstreamChunk::ContextUsage { percentage: 0.1 }));
        events.extend(converter.finish());

        let names: Vec<&'static str> = events.iter().map(|e| e.event_name()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn first_event_is_always_message_start_when_any_output_occurs() {
        let mut converter = Converter::new("m".to_string(), "model".to_string(), 5);
        let events = converter.handle_chunk(&text("hi"));
        assert_eq!(events[0].event_name(), "message_start");
    }

    #[test]
    fn message_delta_emitted_exactly_once_even_after_double_finish() {
        let mut converter = Converter::new("m".to_string(), "model".to_string(), 5);
        converter.handle_chunk(&text("hi"));
        let first_finish = converter.finish();
        let second_finish = converter.finish();
        let delta_count = first_finish
            .iter()
            .chain(second_finish.iter())
            .filter(|e| e.event_name() == "message_delta")
            .count();
        assert_eq!(delta_count, 1);
    }

    #[test]
    fn tool_use_block_closes_on_stop_flag_and_sets_tool_use_stop_reason() {
        let mut converter = Converter::new("m".to_string(), "model".to_string(), 5);
        converter.handle_chunk(&UpstreamChunk::ToolUse {
            name: Some("search".to_string()),
            tool_use_id: Some("t1".to_string()),
            input: None,
            stop: false,
        });
        converter.handle_chunk(&UpstreamChunk::ToolUse {
            name: None,
            tool_use_id: None,
            input: Some("{\"q\":\"rust\"}".to_string()),
            stop: true,
        });
        let events = converter.finish();
        let delta = events
            .iter()
            .find(|e| matches!(e, ClaudeSseEvent::MessageDelta { .. }))
            .unwrap();
        if let ClaudeSseEvent::MessageDelta { delta, .. } = delta {
            assert_eq!(delta.stop_reason.as_deref(), Some(STOP_REASON_TOOL_USE));
        }
    }

    #[test]
    fn ghost_exception_reports_content_delivered() {
        let mut converter = Converter::new("m".to_string(), "model".to_string(), 5);
        converter.handle_chunk(&text("partial"));
        assert!(converter.content_delivered());
    }

    #[test]
    fn no_content_means_finish_emits_nothing() {
        let mut converter = Converter::new("m".to_string(), "model".to_string(), 5);
        assert!(converter.finish().is_empty());
        assert!(!converter.content_delivered());
    }

    #[test]
    fn switching_from_text_to_tool_use_closes_the_text_block_first() {
        let mut converter = Converter::new("m".to_string(), "model".to_string(), 5);
        converter.handle_chunk(&text("hello"));
        let events = converter.handle_chunk(&UpstreamChunk::ToolUse {
            name: Some("search".to_string()),
            tool_use_id: Some("t1".to_string()),
            input: None,
            stop: false,
        });
        assert!(matches!(events[0], ClaudeSseEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(
            events[1],
            ClaudeSseEvent::ContentBlockStart { index: 1, .. }
        ));
    }
}
