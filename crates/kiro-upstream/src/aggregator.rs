//! Non-streaming half of C7: folds the same chunk stream the streaming
//! [`crate::converter::Converter`] consumes into one complete
//! [`MessageResponse`], for `"stream": false` requests (spec.md §4.7).

use kiro_claude::content::ContentBlock;
use kiro_claude::response::{MessageResponse, Usage, STOP_REASON_END_TURN, STOP_REASON_TOOL_USE};
use kiro_claude::tokens::{derive_input_tokens, distribute, estimate_tokens};
use kiro_eventstream::UpstreamChunk;

struct OpenToolUse {
    index: usize,
    id: String,
    name: String,
    partial_json: String,
}

/// Accumulates decoded chunks into a single response body. Unlike
/// [`crate::converter::Converter`] this never emits anything until
/// [`Aggregator::finish`] is called.
pub struct Aggregator {
    message_id: String,
    model: String,
    input_tokens_estimate: u64,
    content: Vec<ContentBlock>,
    open_text: Option<String>,
    open_tool_use: Option<OpenToolUse>,
    any_tool_use: bool,
    content_delivered: bool,
    output_chars: usize,
    final_input_tokens: Option<u64>,
}

impl Aggregator {
    pub fn new(message_id: String, model: String, input_tokens_estimate: u64) -> Self {
        Self {
            message_id,
            model,
            input_tokens_estimate,
            content: Vec::new(),
            open_text: None,
            open_tool_use: None,
            any_tool_use: false,
            content_delivered: false,
            output_chars: 0,
            final_input_tokens: None,
        }
    }

    pub fn content_delivered(&self) -> bool {
        self.content_delivered
    }

    pub fn handle_chunk(&mut self, chunk: &UpstreamChunk) {
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
            }
            UpstreamChunk::Legacy(_) => {}
        }
    }

    fn handle_text(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        self.close_tool_use();
        self.open_text
            .get_or_insert_with(String::new)
            .push_str(content);
        self.output_chars += content.chars().count();
        self.content_delivered = true;
    }

    fn handle_tool_use(
        &mut self,
        name: Option<&str>,
        tool_use_id: Option<&str>,
        input: Option<&str>,
        stop: bool,
    ) {
        if name.is_some() || tool_use_id.is_some() {
            self.close_text();
            self.close_tool_use();
            let index = self.content.len();
            self.content.push(ContentBlock::ToolUse {
                id: String::new(),
                name: String::new(),
                input: serde_json::json!({}),
            });
            self.open_tool_use = Some(OpenToolUse {
                index,
                id: tool_use_id.unwrap_or_default().to_string(),
                name: name.unwrap_or_default().to_string(),
                partial_json: String::new(),
            });
            self.any_tool_use = true;
            self.content_delivered = true;
        }

        if let Some(partial) = input {
            if !partial.is_empty() {
                if let Some(ob) = &mut self.open_tool_use {
                    ob.partial_json.push_str(partial);
                    self.output_chars += partial.chars().count();
                    self.content_delivered = true;
                }
            }
        }

        if stop {
            self.close_tool_use();
        }
    }

    fn close_text(&mut self) {
        if let Some(text) = self.open_text.take() {
            self.content.push(ContentBlock::Text { text });
        }
    }

    fn close_tool_use(&mut self) {
        if let Some(ob) = self.open_tool_use.take() {
            let input: serde_json::Value =
                serde_json::from_str(&ob.partial_json).unwrap_or_else(|_| serde_json::json!({}));
            self.content[ob.index] = ContentBlock::ToolUse {
                id: ob.id,
                name: ob.name,
                input,
            };
        }
    }

    /// Fold all accumulated state into the final response body.
    pub fn finish(mut self) -> MessageResponse {
        self.close_text();
        self.close_tool_use();

        let output_tokens = estimate_tokens(&" ".repeat(self.output_chars));
        let input_tokens = self.final_input_tokens.unwrap_or(self.input_tokens_estimate);
        let (input, creation, read) = distribute(input_tokens);
        let stop_reason = if self.any_tool_use {
            STOP_REASON_TOOL_USE
        } else {
            STOP_REASON_END_TURN
        };

        let mut response = MessageResponse::new(self.message_id, self.model);
        response.content = self.content;
        response.stop_reason = Some(stop_reason.to_string());
        response.usage = Usage {
            input_tokens: input,
            output_tokens,
            cache_creation_input_tokens: creation,
            cache_read_input_tokens: read,
        };
        response
    }
}
