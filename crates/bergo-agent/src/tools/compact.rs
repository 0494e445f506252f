//! Context compaction sub-task.
//!
//! When session usage crosses the configured share of the model's context
//! window, the agent forks a Compact-mode task on a copy of the transcript.
//! The task's job is to bring the memento file up to date so the model can
//! recover after the context reset; the caller then appends the `Compact`
//! timeline event that truncates future transcripts.

use super::remove_last_assistant_tool_calls;
use crate::errors::AgentError;
use crate::io::MsgKind;
use crate::task::{SharedExtract, Task, TaskEnv};
use bergo_llm::ChatItem;
use bergo_session::{AgentMode, Query};

pub async fn run_compact(env: &TaskEnv, mut chats: Vec<ChatItem>) -> Result<String, AgentError> {
    remove_last_assistant_tool_calls(&mut chats);
    let query = Query::new("", AgentMode::Compact);
    chats.push(ChatItem::user(query.build()));

    let mut task = Task::new(
        chats,
        AgentMode::Compact,
        false,
        SharedExtract::new(),
        env.app.config.main_model.clone(),
    );
    env.output.on_system("Compacting...", MsgKind::Text);
    let outcome = task.run(env).await?;
    Ok(outcome.content)
}
