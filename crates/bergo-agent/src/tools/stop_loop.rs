use super::{ToolDesc, ToolInput, ToolOutput, TOOL_STOP_LOOP};
use bergo_llm::{ToolCall, ToolSchema};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct StopLoopArgs {
    #[serde(default)]
    message: String,
}

async fn stop_loop(input: ToolInput) -> ToolOutput {
    let args: StopLoopArgs = serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    ToolOutput::ok(args.message)
}

fn render(call: &ToolCall, _content: &str) -> String {
    let args: StopLoopArgs = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    args.message
}

pub fn stop_loop_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_STOP_LOOP,
        intent: "",
        schema: ToolSchema::function(
            TOOL_STOP_LOOP,
            "stop_loop ends the current agentic loop. Use it to: 1. give a short summary of what \
             you did once the work is done (in Agent mode, make sure the memento file is current \
             before calling it); 2. ask the user for information you cannot find yourself.",
            json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "message for the user; markdown is supported"
                    }
                },
                "required": ["message"]
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(stop_loop(input))),
        render: Some(render),
    }
}
