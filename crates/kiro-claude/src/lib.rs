pub mod content;
pub mod request;
pub mod response;
pub mod sse;
pub mod tokens;

pub use content::{ContentBlock, ImageSource, MessageContent, ToolResultContent};
pub use request::{Message, MessageRequest, Role, SystemPrompt, ThinkingConfig, ToolDefinition};
pub use response::{MessageResponse, Usage};
pub use sse::ClaudeSseEvent;
