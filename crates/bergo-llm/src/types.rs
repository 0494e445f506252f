use serde::{Deserialize, Serialize};
use std::fmt;

/// Finish reasons as reported by OpenAI-compatible providers.
pub mod finish_reason {
    pub const STOP: &str = "stop";
    pub const LENGTH: &str = "length";
    pub const FUNCTION_CALL: &str = "function_call";
    pub const TOOL_CALLS: &str = "tool_calls";
    pub const CONTENT_FILTER: &str = "content_filter";
    pub const NULL: &str = "null";
}

/// Role of a chat message. Serialized lowercase to match the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(label)
    }
}

/// One entry of the chat transcript sent to a provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatItem {
    pub role: Option<Role>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// Data URL of an attached image, when the model supports vision.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub img: String,
    /// Marks an assistant item as a prefill prefix on retry.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prefix: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_call_id: String,
}

impl ChatItem {
    pub fn system(message: impl Into<String>) -> Self {
        Self {
            role: Some(Role::System),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Assistant),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Tool),
            message: message.into(),
            tool_call_id: tool_call_id.into(),
            ..Default::default()
        }
    }
}

/// Prepend the system prompt to a transcript.
pub fn inject_system_prompt(items: Vec<ChatItem>, system_prompt: &str) -> Vec<ChatItem> {
    let mut all = Vec::with_capacity(items.len() + 1);
    all.push(ChatItem::system(system_prompt));
    all.extend(items);
    all
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A tool call, possibly partial while streaming. `index` is how providers
/// address argument fragments of an already-opened call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub function: ToolFunction,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            index: None,
            function: ToolFunction {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// JSON-schema description of one tool, in the chat-completions `tools` shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolSchemaFunction,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchemaFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: ToolSchemaFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Cumulative token accounting. Cached tokens are counted in addition to the
/// prompt tokens that contain them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cached_tokens += other.cached_tokens;
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

fn format_tokens(tokens: u64) -> String {
    if tokens >= 1000 {
        format!("{:.3}k", tokens as f64 / 1000.0)
    } else {
        tokens.to_string()
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Prompt: {} (cached: {}) | Completion: {} | Total: {}",
            format_tokens(self.prompt_tokens),
            format_tokens(self.cached_tokens),
            format_tokens(self.completion_tokens),
            format_tokens(self.total_tokens)
        )
    }
}

/// One streamed delta from a provider. Any subset of the fields may be set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseDelta {
    pub content: String,
    pub reasoning_content: String,
    pub signature: String,
    pub finish_reason: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ResponseDelta {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn finish(reason: &str) -> Self {
        Self {
            finish_reason: reason.to_string(),
            ..Default::default()
        }
    }
}

/// A single streaming request: transcript plus tool schemas.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub chat_items: Vec<ChatItem>,
    pub tools: Vec<ToolSchema>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_display_uses_k_units() {
        let usage = TokenUsage {
            prompt_tokens: 1234,
            completion_tokens: 56,
            total_tokens: 1290,
            cached_tokens: 0,
        };
        let rendered = usage.to_string();
        assert!(rendered.contains("1.234k"));
        assert!(rendered.contains("Completion: 56"));
    }

    #[test]
    fn token_usage_accumulates_all_fields() {
        let mut usage = TokenUsage::default();
        usage.accumulate(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cached_tokens: 3,
        });
        usage.accumulate(&TokenUsage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
            cached_tokens: 1,
        });
        assert_eq!(usage.prompt_tokens, 11);
        assert_eq!(usage.completion_tokens, 6);
        assert_eq!(usage.total_tokens, 17);
        assert_eq!(usage.cached_tokens, 4);
    }

    #[test]
    fn inject_system_prompt_prepends() {
        let items = vec![ChatItem::user("hello")];
        let all = inject_system_prompt(items, "be helpful");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].role, Some(Role::System));
        assert_eq!(all[1].message, "hello");
    }
}
