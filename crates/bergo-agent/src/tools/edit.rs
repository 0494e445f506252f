use super::{ToolDesc, ToolInput, ToolOutput, TOOL_EDIT_DIFF, TOOL_EDIT_WHOLE};
use crate::fsutil::{create_if_not_exists, Editor};
use bergo_llm::{ToolCall, ToolSchema};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct EditDiffArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    search: String,
    #[serde(default)]
    replace: String,
}

#[derive(Default, Deserialize)]
struct EditWholeArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    replace: String,
}

/// Run the external syntax validator on the written file. The file is not
/// reverted on failure; the model is expected to fix forward.
fn check_syntax(input: &ToolInput, path: &str) -> Result<(), String> {
    let filename = std::path::Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    if !input.app.validator.supports(&filename) {
        return Ok(());
    }
    let Ok(content) = std::fs::read(path) else {
        return Ok(());
    };
    input
        .app
        .validator
        .check(&filename, &content)
        .map_err(|report| {
            format!("syntax error in {path}:\n{report}\nplease try again to fix it")
        })
}

async fn edit_diff(input: ToolInput) -> ToolOutput {
    let args: EditDiffArgs = serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    if let Err(error) = create_if_not_exists(&args.path) {
        return ToolOutput::error(format!("failed to create {} because: {error}", args.path));
    }
    let editor = Editor::new(&args.path);
    if let Err(error) = editor.edit_by_diff(&args.search, &args.replace) {
        return ToolOutput::error(format!("failed to edit {} because: {error}", args.path));
    }
    if let Err(report) = check_syntax(&input, &args.path) {
        return ToolOutput::error(format!("syntax check of {} failed: {report}", args.path));
    }
    ToolOutput::ok(format!("{} edited successfully", args.path))
}

async fn edit_whole(input: ToolInput) -> ToolOutput {
    let args: EditWholeArgs =
        serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    if let Err(error) = create_if_not_exists(&args.path) {
        return ToolOutput::error(format!("failed to create {} because: {error}", args.path));
    }
    let editor = Editor::new(&args.path);
    if let Err(error) = editor.edit_whole(&args.replace) {
        return ToolOutput::error(format!("failed to edit {} because: {error}", args.path));
    }
    if let Err(report) = check_syntax(&input, &args.path) {
        return ToolOutput::error(format!("syntax check of {} failed: {report}", args.path));
    }
    ToolOutput::ok(format!("{} edited successfully", args.path))
}

fn render_diff(call: &ToolCall, _content: &str) -> String {
    let args: EditDiffArgs = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    format!("edited {} (search/replace)", args.path)
}

fn render_whole(call: &ToolCall, _content: &str) -> String {
    let args: EditWholeArgs = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    format!("rewrote {}", args.path)
}

pub fn edit_diff_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_EDIT_DIFF,
        intent: "Bergo is editing file",
        schema: ToolSchema::function(
            TOOL_EDIT_DIFF,
            "edit_diff edits a file in search/replace mode. Search for at least one full line: \
             the tool replaces whole lines. The search block must match exactly one place in the \
             file; when the tool reports multiple matches, add surrounding lines to make the \
             search unambiguous.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "file path" },
                    "search": {
                        "type": "string",
                        "description": "lines to find; must not be empty and should be distinctive enough to match once"
                    },
                    "replace": {
                        "type": "string",
                        "description": "replacement lines; empty deletes the match. Keep the indentation."
                    }
                },
                "required": ["path", "search"]
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(edit_diff(input))),
        render: Some(render_diff),
    }
}

pub fn edit_whole_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_EDIT_WHOLE,
        intent: "Bergo is editing file",
        schema: ToolSchema::function(
            TOOL_EDIT_WHOLE,
            "edit_whole overwrites a file with new content. Especially useful when creating a \
             new file. One response round should contain only one edit.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "file path" },
                    "replace": { "type": "string", "description": "the new file content" }
                },
                "required": ["path", "replace"]
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(edit_whole(input))),
        render: Some(render_whole),
    }
}
