use super::{approval_granted, ToolDesc, ToolInput, ToolOutput, TOOL_SHELL_CMD};
use crate::shell::{over_line_limit, run_task_command, MAX_OUTPUT_LINES};
use bergo_llm::{ToolCall, ToolSchema};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct ShellCmdArgs {
    #[serde(default)]
    command: String,
}

async fn shell_cmd(input: ToolInput) -> ToolOutput {
    let args: ShellCmdArgs = serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    let prompt = format!("Are you sure to run the command: {}", args.command);
    if let Err(skip) = approval_granted(&input, TOOL_SHELL_CMD, &prompt) {
        return ToolOutput::error(skip);
    }

    let result = if input.is_task {
        run_task_command(&args.command).await
    } else {
        match input.app.shell.run(&args.command).await {
            Ok(result) => result,
            Err(error) => return ToolOutput::error(error.to_string()),
        }
    };
    if over_line_limit(&result) {
        return ToolOutput::error(format!(
            "the output is longer than {MAX_OUTPUT_LINES} lines, try some commands to filter the \
             output or save output as a file and read it later"
        ));
    }
    ToolOutput::ok(result)
}

fn render(call: &ToolCall, _content: &str) -> String {
    let args: ShellCmdArgs = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    format!("command executed: {}", args.command)
}

pub fn shell_cmd_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_SHELL_CMD,
        intent: "Bergo is running shell command",
        schema: ToolSchema::function(
            TOOL_SHELL_CMD,
            "shell_cmd runs a shell command such as grep, ls or find; pipes are supported. Only \
             a single line is accepted (newlines are cut off). *Never run programs that need \
             user interaction.*",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "the shell command to execute" }
                },
                "required": ["command"]
            }),
        ),
        requires_vision: false,
        requires_approval: true,
        handler: Arc::new(|input| Box::pin(shell_cmd(input))),
        render: Some(render),
    }
}
