use super::{ToolDesc, ToolInput, ToolOutput, TOOL_READ_IMG};
use bergo_llm::{ToolCall, ToolSchema};
use bergo_session::attachment::is_image_file;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

#[derive(Default, Deserialize)]
struct ReadImgArgs {
    #[serde(default)]
    path: String,
}

async fn read_img(input: ToolInput) -> ToolOutput {
    let args: ReadImgArgs = serde_json::from_str(&input.call.function.arguments).unwrap_or_default();
    let path = Path::new(&args.path);
    match path.metadata() {
        Err(error) => return ToolOutput::error(format!("cannot read image: {error}")),
        Ok(metadata) if metadata.is_dir() => {
            return ToolOutput::error(format!(
                "path is a directory, not an image file: {}",
                args.path
            ));
        }
        Ok(_) => {}
    }
    if !is_image_file(&args.path) {
        return ToolOutput::error(format!("unsupported image format: {}", args.path));
    }
    ToolOutput::ok(format!("Image loaded: {}", args.path))
}

fn render(call: &ToolCall, _content: &str) -> String {
    let args: ReadImgArgs = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    format!("read image {}", args.path)
}

pub fn read_img_tool() -> ToolDesc {
    ToolDesc {
        name: TOOL_READ_IMG,
        intent: "Bergo is reading image",
        schema: ToolSchema::function(
            TOOL_READ_IMG,
            "read_img loads an image file (jpg, jpeg, png, gif, webp) and sends it to the model \
             for visual analysis.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "image file path" }
                },
                "required": ["path"]
            }),
        ),
        requires_vision: true,
        requires_approval: false,
        handler: Arc::new(|input| Box::pin(read_img(input))),
        render: Some(render),
    }
}
