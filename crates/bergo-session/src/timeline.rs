//! The append-only session event log.
//!
//! Every mutation persists the timeline to its session-scoped JSON file
//! before control returns; persistence failures are warnings, never fatal.
//! The timeline owns the checkpoint shadow repository and is the single
//! source of truth for the chat transcript sent to the model.

use crate::checkpoint::Checkpoint;
use crate::errors::SessionError;
use crate::memento;
use crate::query::Query;
use crate::storage::StorePaths;
use bergo_llm::{ChatItem, TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const COMPACT_RECOVERY_MESSAGE: &str = "context exhausted, read memento file to resume";

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

/// Sortable session id: local wall-clock `YYYYMMDDHHMMSS`, falling back to
/// epoch seconds when no `date` binary is available.
pub fn generate_session_id() -> String {
    let output = std::process::Command::new("date")
        .arg("+%Y%m%d%H%M%S")
        .output();
    if let Ok(output) = output {
        if output.status.success() {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !text.is_empty() {
                return text;
            }
        }
    }
    now_unix().to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponseItem {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reasoning_content: String,
    #[serde(default)]
    pub rendered_content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub signature: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUseItem {
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub rendered: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointItem {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub token_usage: TokenUsage,
}

/// Event payloads, persisted in the externally-tagged `{type, data}` form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TimelinePayload {
    UserInput(Query),
    #[serde(rename = "LLMResponse")]
    LlmResponse(LlmResponseItem),
    ToolUse(ToolUseItem),
    CheckpointSave(CheckpointItem),
    Compact(Option<Query>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    #[serde(flatten)]
    pub payload: TimelinePayload,
    pub ts: i64,
    pub id: i64,
    #[serde(default)]
    pub git_hash: String,
    #[serde(default)]
    pub epoch: i64,
}

#[derive(Serialize, Deserialize)]
struct TimelineFile {
    max_id: i64,
    session_id: String,
    items: Vec<TimelineItem>,
    branch: String,
    is_checkpoint_init: bool,
}

pub struct Timeline {
    pub max_id: i64,
    pub session_id: String,
    pub items: Vec<TimelineItem>,
    pub branch: String,
    pub is_checkpoint_init: bool,
    pub task_epoch: i64,
    checkpoint: Option<Checkpoint>,
    paths: StorePaths,
}

impl Timeline {
    pub fn new(session_id: impl Into<String>, paths: StorePaths) -> Self {
        let session_id = session_id.into();
        Self {
            max_id: 0,
            branch: format!("Session {session_id}"),
            session_id,
            items: Vec::new(),
            is_checkpoint_init: false,
            task_epoch: 0,
            checkpoint: None,
            paths,
        }
    }

    /// Load a stored session, or start fresh if nothing is on disk.
    pub fn load(session_id: impl Into<String>, paths: StorePaths) -> Self {
        let mut timeline = Self::new(session_id, paths);
        let file = timeline.paths.timeline_file(&timeline.session_id);
        let Ok(raw) = std::fs::read(&file) else {
            return timeline;
        };
        match serde_json::from_slice::<TimelineFile>(&raw) {
            Ok(stored) => {
                timeline.max_id = stored.max_id;
                timeline.session_id = stored.session_id;
                timeline.items = stored.items;
                timeline.branch = stored.branch;
                timeline.is_checkpoint_init = stored.is_checkpoint_init;
                if timeline.is_checkpoint_init {
                    if let Err(error) = timeline.init_checkpoint() {
                        tracing::warn!("failed to reopen checkpoint: {error}");
                    }
                }
            }
            Err(error) => {
                tracing::warn!("failed to parse timeline file {}: {error}", file.display());
            }
        }
        timeline
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Create (or reopen) the shadow repository for this session.
    pub fn init_checkpoint(&mut self) -> Result<(), SessionError> {
        if self.checkpoint.is_none() {
            self.checkpoint = Some(Checkpoint::new(
                self.paths.workspace(),
                self.paths.shadow_repo(&self.session_id),
            ));
        }
        if !self.is_checkpoint_init {
            self.checkpoint
                .as_ref()
                .map(Checkpoint::init_shadow_repo)
                .transpose()?;
            self.is_checkpoint_init = true;
        }
        Ok(())
    }

    pub fn set_task_epoch(&mut self) {
        self.task_epoch = now_unix();
    }

    fn push_item(&mut self, payload: TimelinePayload, git_hash: String, epoch: i64) {
        self.max_id += 1;
        self.items.push(TimelineItem {
            payload,
            ts: now_unix(),
            id: self.max_id,
            git_hash,
            epoch,
        });
        self.store();
    }

    /// A fresh user query may only follow a model response or tool result
    /// (or start the session); otherwise the pending one must be replaced.
    pub fn can_add_query(&self) -> bool {
        for item in self.items.iter().rev() {
            match item.payload {
                TimelinePayload::UserInput(_) | TimelinePayload::Compact(_) => return false,
                TimelinePayload::LlmResponse(_) | TimelinePayload::ToolUse(_) => return true,
                TimelinePayload::CheckpointSave(_) => continue,
            }
        }
        true
    }

    pub fn add_user_input(&mut self, query: Query) {
        self.push_item(TimelinePayload::UserInput(query), String::new(), 0);
    }

    /// Replace the pending user turn in place so user turns never stack
    /// without an intervening model response.
    pub fn replace_last_user_input(&mut self, mut query: Query) {
        let Some(position) = self.items.iter().rposition(|item| {
            matches!(
                item.payload,
                TimelinePayload::UserInput(_) | TimelinePayload::Compact(_)
            )
        }) else {
            return;
        };
        let item = &mut self.items[position];
        if matches!(item.payload, TimelinePayload::Compact(_)) {
            query.set_compact();
            item.payload = TimelinePayload::Compact(Some(query));
        } else {
            item.payload = TimelinePayload::UserInput(query);
        }
        item.ts = now_unix();
        self.store();
    }

    pub fn add_llm_response(&mut self, response: LlmResponseItem) {
        let epoch = self.task_epoch;
        self.push_item(TimelinePayload::LlmResponse(response), String::new(), epoch);
    }

    pub fn add_tool_call_result(
        &mut self,
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        rendered: impl Into<String>,
    ) {
        self.push_item(
            TimelinePayload::ToolUse(ToolUseItem {
                tool_id: tool_id.into(),
                tool_name: tool_name.into(),
                content: content.into(),
                rendered: rendered.into(),
            }),
            String::new(),
            0,
        );
    }

    pub fn add_compact(&mut self, query: Option<Query>) {
        self.push_item(TimelinePayload::Compact(query), String::new(), 0);
    }

    /// Snapshot the workspace and append the checkpoint event.
    pub fn checkpoint_save(
        &mut self,
        message: &str,
        token_usage: TokenUsage,
    ) -> Result<String, SessionError> {
        self.init_checkpoint()?;
        let checkpoint = self
            .checkpoint
            .as_ref()
            .ok_or_else(|| SessionError::Git("checkpoint not initialized".to_string()))?;
        let hash = checkpoint.save(message)?;
        self.push_item(
            TimelinePayload::CheckpointSave(CheckpointItem {
                message: message.to_string(),
                token_usage,
            }),
            hash.clone(),
            0,
        );
        Ok(hash)
    }

    /// Restore the workspace to `hash` and truncate all events from the first
    /// event carrying that hash onward. Unknown hashes surface the git error
    /// and leave the timeline untouched.
    pub fn revert(&mut self, hash: &str) -> Result<(), SessionError> {
        self.init_checkpoint()?;
        let checkpoint = self
            .checkpoint
            .as_ref()
            .ok_or_else(|| SessionError::Git("checkpoint not initialized".to_string()))?;
        checkpoint.revert(hash)?;
        if let Some(position) = self.items.iter().position(|item| item.git_hash == hash) {
            self.items.truncate(position);
        }
        self.store();
        memento::stash_if_present(&self.paths, &self.session_id);
        Ok(())
    }

    pub fn revert_to_last_checkpoint(&mut self) -> Result<(), SessionError> {
        let hash = self
            .items
            .iter()
            .rev()
            .find_map(|item| match &item.payload {
                TimelinePayload::CheckpointSave(_) => Some(item.git_hash.clone()),
                _ => None,
            });
        match hash {
            Some(hash) => self.revert(&hash),
            None => Ok(()),
        }
    }

    /// Token usage recorded at the most recent checkpoint.
    pub fn last_checkpoint_token_usage(&self) -> TokenUsage {
        self.items
            .iter()
            .rev()
            .find_map(|item| match &item.payload {
                TimelinePayload::CheckpointSave(checkpoint) => Some(checkpoint.token_usage),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Drop the tool-call list from a trailing assistant event. Defensive
    /// normalization when the previous round ended abnormally: a dangling
    /// tool-call list without matching results is a protocol error upstream.
    pub fn clean_tail_tool_calls(&mut self) {
        if let Some(item) = self.items.last_mut() {
            if let TimelinePayload::LlmResponse(response) = &mut item.payload {
                response.tool_calls.clear();
            }
        }
        self.store();
    }

    /// Build the provider-neutral chat transcript.
    ///
    /// A `Compact` event discards everything accumulated so far and restarts
    /// from itself. Reasoning content is only forwarded for responses stamped
    /// with the current task epoch; older reasoning is dropped to save
    /// tokens.
    pub fn get_chat_context(&self, add_cot: bool) -> Vec<ChatItem> {
        let mut chats: Vec<ChatItem> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match &item.payload {
                TimelinePayload::UserInput(query) => {
                    chats.push(ChatItem::user(query.build()));
                }
                TimelinePayload::ToolUse(tool_use) => {
                    chats.push(ChatItem::tool_result(
                        tool_use.tool_id.clone(),
                        tool_use.content.clone(),
                    ));
                }
                TimelinePayload::Compact(query) => {
                    chats.clear();
                    match query {
                        Some(query) => chats.push(ChatItem::user(query.build())),
                        None => chats.push(ChatItem::user(COMPACT_RECOVERY_MESSAGE)),
                    }
                }
                TimelinePayload::LlmResponse(response) => {
                    let reasoning = if add_cot && item.epoch == self.task_epoch {
                        response.reasoning_content.clone()
                    } else {
                        String::new()
                    };
                    chats.push(ChatItem {
                        role: Some(bergo_llm::Role::Assistant),
                        message: response.content.clone(),
                        reasoning_content: reasoning,
                        signature: response.signature.clone(),
                        tool_calls: response.tool_calls.clone(),
                        ..Default::default()
                    });
                }
                TimelinePayload::CheckpointSave(_) => {}
            }
        }
        chats
    }

    /// Persist after a mutation. Failures warn and the session continues.
    pub fn store(&self) {
        if self.session_id.is_empty() {
            return;
        }
        if let Err(error) = self.try_store() {
            tracing::warn!("failed to persist timeline: {error}");
        }
    }

    fn try_store(&self) -> Result<(), SessionError> {
        let file = self.paths.timeline_file(&self.session_id);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = TimelineFile {
            max_id: self.max_id,
            session_id: self.session_id.clone(),
            items: self.items.clone(),
            branch: self.branch.clone(),
            is_checkpoint_init: self.is_checkpoint_init,
        };
        let raw = serde_json::to_vec_pretty(&stored)
            .map_err(|error| SessionError::Serialization(error.to_string()))?;
        let tmp = file.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &file)?;
        Ok(())
    }

    /// Plain-text rendering of the whole session for the history surface.
    pub fn history_dump(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            match &item.payload {
                TimelinePayload::LlmResponse(response) => {
                    out.push_str("Bergo: ");
                    if response.rendered_content.is_empty() {
                        out.push_str(&response.content);
                    } else {
                        out.push_str(&response.rendered_content);
                    }
                    out.push_str("\n\n");
                }
                TimelinePayload::UserInput(query) => {
                    out.push_str("User: ");
                    out.push_str(&query.user_input);
                    out.push_str("\n\n");
                }
                TimelinePayload::ToolUse(tool_use) => {
                    out.push_str(&tool_use.rendered);
                    out.push_str("\n\n");
                }
                TimelinePayload::CheckpointSave(_) => {
                    out.push_str(&format!("checkpoint saved, hash: {}\n\n", item.git_hash));
                }
                TimelinePayload::Compact(_) => {
                    out.push_str("Compacting...\n\n");
                }
            }
        }
        out
    }

    /// Checkpoint entries (newest last) offered for revert in `/history`.
    pub fn checkpoint_entries(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .filter_map(|item| match &item.payload {
                TimelinePayload::CheckpointSave(checkpoint) => {
                    Some((item.git_hash.clone(), checkpoint.message.clone()))
                }
                _ => None,
            })
            .collect()
    }
}
