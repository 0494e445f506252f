//! Tool registry and dispatch.
//!
//! Every tool pairs a JSON-schema with an async handler. Dispatch resolves
//! the tool, validates the call arguments against the schema, and runs the
//! handler; unknown tools and validation failures become tool-result strings
//! for the model, never task failures.

pub mod berag;
pub mod compact;
pub mod edit;
pub mod read_file;
pub mod read_img;
pub mod remove;
pub mod shell_cmd;
pub mod stop_loop;

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::io::{OutputSink, Prompter, APPROVE_ALWAYS, APPROVE_SKIP, APPROVE_YES};
use crate::task::SharedExtract;
use bergo_llm::{AbortHandle, ChatItem, ToolCall, ToolSchema};
use bergo_session::AgentMode;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

pub const TOOL_EDIT_DIFF: &str = "edit_diff";
pub const TOOL_EDIT_WHOLE: &str = "edit_whole";
pub const TOOL_READ_FILE: &str = "read_file";
pub const TOOL_READ_IMG: &str = "read_img";
pub const TOOL_REMOVE: &str = "remove";
pub const TOOL_SHELL_CMD: &str = "shell_cmd";
pub const TOOL_STOP_LOOP: &str = "stop_loop";
pub const TOOL_BERAG: &str = "berag";
pub const TOOL_BERAG_EXTRACT: &str = "berag_extract";
pub const TOOL_EXTRACT_RESULT: &str = "extract_result";

/// Everything a tool handler may need. Cloned per call so parallel handlers
/// own their data; `task_chats` is the sub-task's snapshot of the parent
/// conversation.
#[derive(Clone)]
pub struct ToolInput {
    pub call: ToolCall,
    pub app: Arc<AppContext>,
    pub output: Arc<dyn OutputSink>,
    pub prompter: Option<Arc<dyn Prompter>>,
    pub allow_map: Arc<Mutex<HashSet<String>>>,
    pub is_task: bool,
    pub task_chats: Vec<ChatItem>,
    pub shared: Option<Arc<SharedExtract>>,
    pub abort: AbortHandle,
}

/// Result of one tool invocation.
#[derive(Clone, Debug, Default)]
pub struct ToolOutput {
    pub tool_call: Option<ToolCall>,
    pub content: String,
    pub rendered: String,
    /// Returned to the model as the tool result.
    pub error: Option<String>,
    /// Aborts the whole task.
    pub interrupt: Option<String>,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn interrupt(message: impl Into<String>) -> Self {
        Self {
            interrupt: Some(message.into()),
            ..Default::default()
        }
    }
}

pub type ToolFuture = Pin<Box<dyn Future<Output = ToolOutput> + Send>>;
pub type ToolHandler = Arc<dyn Fn(ToolInput) -> ToolFuture + Send + Sync>;
pub type RenderFn = fn(&ToolCall, &str) -> String;

pub struct ToolDesc {
    pub name: &'static str,
    /// Transient status line shown while the model is calling this tool.
    pub intent: &'static str,
    pub schema: ToolSchema,
    pub requires_vision: bool,
    pub requires_approval: bool,
    pub handler: ToolHandler,
    pub render: Option<RenderFn>,
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolDesc>>,
}

impl ToolRegistry {
    pub fn register(&mut self, desc: ToolDesc) {
        self.tools.insert(desc.name.to_string(), Arc::new(desc));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolDesc>> {
        self.tools.get(name)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|desc| desc.schema.clone())
            .collect();
        schemas.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

/// Tools available to the main agent loop. `read_img` is registered only
/// when the active model declares vision support.
pub fn main_registry(support_vision: bool) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(edit::edit_diff_tool());
    registry.register(edit::edit_whole_tool());
    registry.register(read_file::read_file_tool());
    registry.register(remove::remove_tool());
    registry.register(shell_cmd::shell_cmd_tool());
    registry.register(stop_loop::stop_loop_tool());
    registry.register(berag::berag_tool());
    if support_vision {
        registry.register(read_img::read_img_tool());
    }
    registry
}

/// Restricted toolset for a sub-agent mode.
pub fn mode_registry(mode: AgentMode) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    match mode {
        AgentMode::Berag => {
            registry.register(berag::berag_extract_tool());
            registry.register(shell_cmd::shell_cmd_tool());
            registry.register(read_file::read_file_tool());
            registry.register(stop_loop::stop_loop_tool());
        }
        AgentMode::BeragExtract => {
            registry.register(read_file::read_file_tool());
            registry.register(berag::extract_result_tool());
        }
        AgentMode::Compact => {
            registry.register(read_file::read_file_tool());
            registry.register(edit::edit_whole_tool());
            registry.register(edit::edit_diff_tool());
            registry.register(stop_loop::stop_loop_tool());
        }
        _ => {}
    }
    registry
}

/// Parse and validate a tool call's arguments against the tool's schema.
/// Validation is structural: required keys plus primitive type checks on the
/// declared top-level properties.
pub fn json_schema_exam(desc: &ToolDesc, call: &ToolCall) -> Result<Value, ToolError> {
    let raw = if call.function.arguments.trim().is_empty() {
        "{}"
    } else {
        call.function.arguments.as_str()
    };
    let parsed: Value = serde_json::from_str(raw).map_err(|error| {
        ToolError::Validation(format!(
            "invalid JSON arguments for tool [{}]: {error}",
            call.function.name
        ))
    })?;
    let object = parsed
        .as_object()
        .ok_or_else(|| ToolError::Validation("tool arguments must be a JSON object".to_string()))?;

    let schema = &desc.schema.function.parameters;
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(ToolError::Validation(format!(
                    "field: [{key}] err message: [missing required argument]"
                )));
            }
        }
    }
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in object {
            let Some(property) = properties.get(key) else {
                continue;
            };
            let Some(expected) = property.get("type").and_then(Value::as_str) else {
                continue;
            };
            let valid = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !valid {
                return Err(ToolError::Validation(format!(
                    "field: [{key}] err message: [expected type '{expected}']"
                )));
            }
        }
    }
    Ok(parsed)
}

/// Gate an approval-required tool behind the user prompt. Sub-tasks never
/// prompt. Returns the skip error message when the user declines.
pub fn approval_granted(input: &ToolInput, tool_name: &str, prompt: &str) -> Result<(), String> {
    if input.is_task {
        return Ok(());
    }
    {
        let allowed = input
            .allow_map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if allowed.contains(tool_name) {
            return Ok(());
        }
    }
    let Some(prompter) = &input.prompter else {
        return Ok(());
    };
    let choice = prompter.select(prompt, &[APPROVE_YES, APPROVE_ALWAYS, APPROVE_SKIP]);
    if choice == APPROVE_SKIP {
        return Err("User choose to skip".to_string());
    }
    if choice == APPROVE_ALWAYS {
        let mut allowed = input
            .allow_map
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        allowed.insert(tool_name.to_string());
    }
    Ok(())
}

/// Resolve, validate, and run one tool call. Unknown tools and schema
/// violations come back as error outputs, not failures.
pub async fn dispatch(registry: &ToolRegistry, input: ToolInput) -> ToolOutput {
    let call = input.call.clone();
    let Some(desc) = registry.get(&call.function.name) else {
        let mut output = ToolOutput::error(format!("tool {} not found", call.function.name));
        output.tool_call = Some(call);
        return output;
    };
    if let Err(error) = json_schema_exam(desc, &call) {
        let mut output = ToolOutput::error(error.to_string());
        output.tool_call = Some(call);
        return output;
    }
    let mut output = (desc.handler)(input).await;
    if output.tool_call.is_none() {
        output.tool_call = Some(call);
    }
    output
}

/// Drop the tool-call list from a trailing assistant item so a sub-task's
/// chat snapshot does not end with unanswered calls.
pub fn remove_last_assistant_tool_calls(chats: &mut [ChatItem]) {
    if let Some(last) = chats.last_mut() {
        if last.role == Some(bergo_llm::Role::Assistant) {
            last.tool_calls.clear();
        }
    }
}
