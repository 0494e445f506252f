//! Model-driven retrieval (berag).
//!
//! `berag` forks a sub-agent that shares the caller's context and hunts for
//! relevant text in parallel; each file it wants read in depth goes through
//! a `berag_extract` sub-agent, which cites line ranges via `extract_result`.
//! All extracted slices aggregate in the request's [`SharedExtract`].

use super::{
    remove_last_assistant_tool_calls, ToolDesc, ToolInput, ToolOutput, TOOL_BERAG,
    TOOL_BERAG_EXTRACT, TOOL_EXTRACT_RESULT,
};
use crate::fsutil::FileReader;
use crate::io::MsgKind;
use crate::task::{ExtractItem, SharedExtract, Task, TaskEnv};
use bergo_llm::{ChatItem, ToolSchema};
use bergo_session::{AgentMode, Query};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct BeragArgs {
    #[serde(default)]
    content: String,
}

#[derive(Default, Deserialize)]
struct BeragExtractArgs {
    #[serde(default)]
    file_path: String,
}

#[derive(Default, Deserialize)]
struct ExtractResultArgs {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    extract_items: Vec<ExtractItemArgs>,
}

#[derive(Default, Deserialize)]
struct ExtractItemArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    start_line: u64,
    #[serde(default)]
    end_line: u64,
}

fn task_env(input: &ToolInput) -> TaskEnv {
    TaskEnv {
        app: input.app.clone(),
        output: input.output.clone(),
        abort: input.abort.clone(),
    }
}

async fn berag(input: ToolInput) -> ToolOutput {
    let args: BeragArgs = serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    let mut chats = input.task_chats.clone();
    remove_last_assistant_tool_calls(&mut chats);
    let query = Query::new(args.content, AgentMode::Berag);
    chats.push(ChatItem::user(query.build()));

    let shared = SharedExtract::new();
    let mut task = Task::new(
        chats,
        AgentMode::Berag,
        true,
        shared.clone(),
        input.app.config.berag_model.clone(),
    );
    let outcome = match task.run(&task_env(&input)).await {
        Ok(outcome) => outcome,
        Err(error) => return ToolOutput::interrupt(error.to_string()),
    };

    let items = shared.get_all();
    let usage = shared.get_usage();
    input.output.on_system(
        &format!("berag found {} items\ntoken usage: {usage}", items.len()),
        MsgKind::Text,
    );
    if items.is_empty() {
        return ToolOutput::ok("can not find related content");
    }

    let mut content = format!("<summary>{}</summary>\n", outcome.content);
    for item in &items {
        content.push_str(&item.to_string());
        content.push('\n');
    }
    ToolOutput::ok(content)
}

async fn berag_extract(input: ToolInput) -> ToolOutput {
    let args: BeragExtractArgs =
        serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    let file_path = args.file_path.trim().to_string();

    let mut chats = input.task_chats.clone();
    remove_last_assistant_tool_calls(&mut chats);
    let query = Query::new(format!("Target file: {file_path}"), AgentMode::BeragExtract);
    chats.push(ChatItem::user(query.build()));

    // Results flow into the caller's aggregator so parallel extracts land in
    // one place.
    let shared = input.shared.clone().unwrap_or_else(SharedExtract::new);
    let mut task = Task::new(
        chats,
        AgentMode::BeragExtract,
        false,
        shared.clone(),
        input.app.config.berag_extract_model.clone(),
    );
    let outcome = match task.run(&task_env(&input)).await {
        Ok(outcome) => outcome,
        Err(error) => return ToolOutput::interrupt(error.to_string()),
    };

    let Some(result_call) = outcome.tool_call else {
        return ToolOutput::ok("no related content");
    };
    let result: ExtractResultArgs =
        serde_json::from_str(&result_call.function.arguments).unwrap_or_default();

    let mut content = String::new();
    let mut summary_target = file_path.clone();
    for item in result.extract_items {
        let path = item.path.trim().to_string();
        let start = item.start_line as usize;
        let end = item.end_line as usize;
        let reader = FileReader::new(&path, 0, false);
        let (slice, target) = if start >= end {
            match reader.read_lines() {
                Ok(lines) => (lines.concat(), path.clone()),
                Err(error) => {
                    return ToolOutput::error(format!("read file {path} failed: {error}"));
                }
            }
        } else {
            match reader.read_range(start, end) {
                Ok(lines) => (lines.concat(), format!("{path}:{start}-{end}")),
                Err(error) => {
                    return ToolOutput::error(format!("read file {path} failed: {error}"));
                }
            }
        };
        let extract = ExtractItem {
            path,
            target: target.clone(),
            content: slice,
        };
        shared.add(extract.clone());
        content.push_str(&extract.to_string());
        content.push('\n');
        summary_target = target;
    }

    if !result.summary.is_empty() {
        content.push_str(&format!(
            "<summary>## {summary_target}:\n{}</summary>\n",
            result.summary
        ));
    }
    if content.is_empty() {
        return ToolOutput::ok("no related content");
    }
    ToolOutput::ok(content)
}

/// Terminal pseudo-tool of the extract mode; the task loop captures its
/// arguments as the result.
async fn extract_result(input: ToolInput) -> ToolOutput {
    ToolOutput {
        tool_call: Some(input.call),
        ..Default::default()
    }
}

pub fn berag_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_BERAG,
        intent: "Bergo is running berag",
        schema: ToolSchema::function(
            TOOL_BERAG,
            "berag is a RAG tool built on the model's own abilities; prefer it for gathering \
             context. Calling it forks a sub-agent that shares your context and searches for \
             helpful material concurrently. If the request is broad or vague, split the goal \
             first or narrow it via the content parameter, otherwise too many files will look \
             relevant. berag can also summarize a directory: instead of code snippets it then \
             returns the overall content of the files, to be mined from the summary.",
            json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "extra guidance describing exactly what to look for: task goal, keywords, file types"
                    }
                },
                "required": []
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(berag(input))),
        render: None,
    }
}

pub fn berag_extract_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_BERAG_EXTRACT,
        intent: "Bergo is extracting related content",
        schema: ToolSchema::function(
            TOOL_BERAG_EXTRACT,
            "berag_extract forks a sub-agent that shares your context and pulls the needed code \
             snippets out of one specific file. It is the file-level helper of berag mode: deep \
             analysis of a single file, extracting the fragments relevant to the task at hand.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "path of the file to analyze; the sub-agent reads it fully and extracts the relevant fragments"
                    }
                },
                "required": ["file_path"]
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(berag_extract(input))),
        render: None,
    }
}

pub fn extract_result_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_EXTRACT_RESULT,
        intent: "",
        schema: ToolSchema::function(
            TOOL_EXTRACT_RESULT,
            "extract_result submits the extraction result and ends the berag_extract flow. \
             Multiple extract_items may be submitted to cite several parts of the file, along \
             with a short summary of its content. Provide the summary unless the file is empty \
             or meaningless.",
            json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "a short paragraph summarizing the file's content"
                    },
                    "extract_items": {
                        "type": "array",
                        "description": "cited fragments: file path plus optional start and end lines",
                        "items": {
                            "type": "object",
                            "properties": {
                                "path": { "type": "string", "description": "file path" },
                                "start_line": { "type": "integer", "description": "first line (optional)" },
                                "end_line": { "type": "integer", "description": "last line (optional)" }
                            }
                        }
                    }
                },
                "required": ["summary"]
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(extract_result(input))),
        render: None,
    }
}
