use super::{ToolDesc, ToolInput, ToolOutput, TOOL_READ_FILE};
use crate::fsutil::FileReader;
use bergo_llm::{ToolCall, ToolSchema};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct ReadFileArgs {
    #[serde(default)]
    path: String,
    #[serde(default)]
    begin: u64,
    #[serde(default)]
    end: u64,
}

fn parse_args(call: &ToolCall) -> ReadFileArgs {
    serde_json::from_str(&call.function.arguments).unwrap_or_default()
}

async fn read_file(input: ToolInput) -> ToolOutput {
    let args = parse_args(&input.call);
    let reader = FileReader::new(&args.path, input.app.config.line_budget, true);

    let lines = if args.begin == 0 && args.end == 0 {
        reader.read_lines()
    } else {
        reader.read_range(args.begin as usize, args.end as usize)
    };
    match lines {
        Ok(lines) => {
            let mut content = format!("## {}:\n", args.path);
            content.push_str(&lines.concat());
            ToolOutput::ok(content)
        }
        Err(error) => ToolOutput::error(error.to_string()),
    }
}

fn render(call: &ToolCall, _content: &str) -> String {
    let args = parse_args(call);
    let scope = if args.begin > 0 || args.end > 0 {
        format!("lines {} to {}", args.begin, args.end)
    } else {
        "whole file".to_string()
    };
    format!("read {}, {}", args.path, scope)
}

pub fn read_file_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_READ_FILE,
        intent: "Bergo is reading file",
        schema: ToolSchema::function(
            TOOL_READ_FILE,
            "read_file reads a file and prefixes every line with its line number. One response \
             round should contain only one read. Long files hit the line_budget limit; use the \
             begin and end parameters to read a specific line range.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "file path" },
                    "begin": {
                        "type": "integer",
                        "description": "first line to read; omit to start at the top"
                    },
                    "end": {
                        "type": "integer",
                        "description": "last line to read; omit to read to the end"
                    }
                },
                "required": ["path"]
            }),
        ),
        requires_vision: false,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(read_file(input))),
        render: Some(render),
    }
}
