use super::{approval_granted, ToolDesc, ToolInput, ToolOutput, TOOL_REMOVE};
use crate::fsutil::outside_root;
use bergo_llm::{ToolCall, ToolSchema};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct RemoveArgs {
    #[serde(default)]
    path: String,
}

async fn remove(input: ToolInput) -> ToolOutput {
    let args: RemoveArgs = serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    let path = args.path.trim().to_string();

    // A sub-task reaching outside the workspace is unrecoverable: abort the
    // whole task instead of letting the model retry.
    if input.is_task && outside_root(input.app.paths.workspace(), &path) {
        return ToolOutput::interrupt(format!(
            "path {path} is outside of the workspace directory"
        ));
    }

    let prompt = format!("Are you sure to remove {path}");
    if let Err(_skip) = approval_granted(&input, TOOL_REMOVE, &prompt) {
        return ToolOutput::error(format!("user choose not to remove {path}"));
    }

    let target = Path::new(&path);
    let result = if target.is_dir() {
        std::fs::remove_dir(target)
    } else {
        std::fs::remove_file(target)
    };
    match result {
        Ok(()) => ToolOutput::ok(format!("{path} removed successfully")),
        Err(error) => ToolOutput::error(format!("remove {path} failed: {error}")),
    }
}

fn render(call: &ToolCall, _content: &str) -> String {
    let args: RemoveArgs = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    format!("{} removed successfully", args.path)
}

pub fn remove_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_REMOVE,
        intent: "Bergo is removing file or directory",
        schema: ToolSchema::function(
            TOOL_REMOVE,
            "remove deletes a file or an empty directory. Whenever you want to delete \
             something, use this tool. Multiple lines are not supported.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "path of the file or directory" }
                },
                "required": ["path"]
            }),
        ),
        requires_vision: false,
        requires_approval: true,
        handler: Arc::new(|input| Box::pin(remove(input))),
        render: Some(render),
    }
}
