/// One tool-use call carried on an assistant-side merged message.
#[derive(Debug, Clone)]
pub struct ToolUseEntry {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// One tool-result carried on a user-side merged message. `status` is always
/// `"success"` regardless of the source block's `is_error` flag — the
/// upstream has no error channel for tool results.
#[derive(Debug, Clone)]
pub struct ToolResultEntry {
    pub tool_use_id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub format: String,
    pub bytes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergedRole {
    User,
    Assistant,
}

/// The per-request, ephemeral intermediate representation the translator
/// builds before emitting the upstream envelope. One entry per logical turn
/// after same-role messages have been merged together.
#[derive(Debug, Clone)]
pub struct MergedMessage {
    pub role: MergedRole,
    pub text: String,
    pub tool_results: Vec<ToolResultEntry>,
    pub tool_uses: Vec<ToolUseEntry>,
    pub images: Vec<ImageEntry>,
    pub thinking: String,
}

impl MergedMessage {
    pub fn new_user(text: String) -> Self {
        Self {
            role: MergedRole::User,
            text,
            tool_results: Vec::new(),
            tool_uses: Vec::new(),
            images: Vec::new(),
            thinking: String::new(),
        }
    }

    pub fn new_assistant(text: String) -> Self {
        Self {
            role: MergedRole::Assistant,
            text,
            tool_results: Vec::new(),
            tool_uses: Vec::new(),
            images: Vec::new(),
            thinking: String::new(),
        }
    }

    /// Merge `other`, which must share this message's role, into `self`:
    /// text concatenates with `\n`, arrays concatenate.
    pub fn merge(&mut self, other: MergedMessage) {
        debug_assert_eq!(self.role, other.role);
        if !other.text.is_empty() {
            if self.text.is_empty() {
                self.text = other.text;
            } else {
                self.text.push('\n');
                self.text.push_str(&other.text);
            }
        }
        self.tool_results.extend(other.tool_results);
        self.tool_uses.extend(other.tool_uses);
        self.images.extend(other.images);
        if !other.thinking.is_empty() {
            if self.thinking.is_empty() {
                self.thinking = other.thinking;
            } else {
                self.thinking.push('\n');
                self.thinking.push_str(&other.thinking);
            }
        }
    }
}
