//! The sub-task engine.
//!
//! A [`Task`] is a nested agent spawned by `berag`, `berag_extract`, or the
//! compaction trigger. It runs on a copy of the parent's chat list with a
//! mode-scoped toolset, optionally dispatching the tool calls of one round
//! in parallel, and reports results through a [`SharedExtract`] aggregator
//! shared by every task descending from one retrieval request.

use crate::context::AppContext;
use crate::errors::AgentError;
use crate::io::OutputSink;
use crate::tools::{self, ToolInput, ToolOutput, ToolRegistry};
use bergo_llm::{inject_system_prompt, AbortHandle, ChatItem, TokenUsage, ToolCall};
use bergo_session::{AgentMode, Query};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static TASK_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn new_task_id() -> String {
    let id = TASK_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
    format!("task_{id}")
}

/// One extracted slice of a file.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractItem {
    pub path: String,
    /// `path` or `path:start-end` for a line range.
    pub target: String,
    pub content: String,
}

impl fmt::Display for ExtractItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<extract_item>## {}\n{}</extract_item>",
            self.target, self.content
        )
    }
}

/// Latest-round progress of one task. Populated every round; nothing in the
/// control flow reads it back yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskProgress {
    pub task_id: String,
    pub response: String,
    pub tool_names: Vec<String>,
    pub token_usage: TokenUsage,
}

#[derive(Default)]
struct SharedExtractInner {
    related: HashMap<String, Vec<ExtractItem>>,
    total: TokenUsage,
    sub_task_info: String,
    task_progress: HashMap<String, TaskProgress>,
}

/// Aggregation point for all sub-tasks descending from one retrieval
/// request. A single mutex guards every accessor.
#[derive(Default)]
pub struct SharedExtract {
    inner: Mutex<SharedExtractInner>,
}

impl SharedExtract {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SharedExtractInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, item: ExtractItem) {
        let mut inner = self.lock();
        inner.related.entry(item.path.clone()).or_default().push(item);
    }

    pub fn get_all(&self) -> Vec<ExtractItem> {
        let inner = self.lock();
        let mut paths: Vec<&String> = inner.related.keys().collect();
        paths.sort();
        paths
            .into_iter()
            .flat_map(|path| inner.related[path].iter().cloned())
            .collect()
    }

    pub fn related_path_count(&self) -> usize {
        self.lock().related.len()
    }

    pub fn usage_update(&self, usage: TokenUsage) {
        self.lock().total.accumulate(&usage);
    }

    pub fn get_usage(&self) -> TokenUsage {
        self.lock().total
    }

    pub fn set_sub_task_info(&self, info: impl Into<String>) {
        self.lock().sub_task_info = info.into();
    }

    pub fn get_sub_task_info(&self) -> String {
        self.lock().sub_task_info.clone()
    }

    /// Record the latest round of a task; only the last round's response and
    /// tool names are retained while usage accumulates.
    pub fn update_task_progress(
        &self,
        task_id: &str,
        response: &str,
        tool_calls: &[ToolCall],
        usage: TokenUsage,
    ) {
        let mut inner = self.lock();
        let progress = inner
            .task_progress
            .entry(task_id.to_string())
            .or_insert_with(|| TaskProgress {
                task_id: task_id.to_string(),
                ..Default::default()
            });
        progress.response = response.to_string();
        progress.tool_names = tool_calls
            .iter()
            .map(|call| call.function.name.clone())
            .collect();
        progress.token_usage.accumulate(&usage);
    }

    pub fn get_task_progress(&self, task_id: &str) -> Option<TaskProgress> {
        self.lock().task_progress.get(task_id).cloned()
    }

    pub fn all_task_progress(&self) -> HashMap<String, TaskProgress> {
        self.lock().task_progress.clone()
    }
}

/// Final result of a completed task: the captured `stop_loop` message (or
/// empty) and the terminating tool call, when one was made.
#[derive(Clone, Debug, Default)]
pub struct TaskOutcome {
    pub content: String,
    pub tool_call: Option<ToolCall>,
}

/// Runtime collaborators handed to a task by its spawning tool.
#[derive(Clone)]
pub struct TaskEnv {
    pub app: Arc<AppContext>,
    pub output: Arc<dyn OutputSink>,
    pub abort: AbortHandle,
}

pub struct Task {
    pub id: String,
    pub context: Vec<ChatItem>,
    pub mode: AgentMode,
    pub parallel_tool_use: bool,
    pub shared: Arc<SharedExtract>,
    pub model: String,
    registry: ToolRegistry,
}

#[derive(Deserialize)]
struct StopLoopArgs {
    #[serde(default)]
    message: String,
}

impl Task {
    pub fn new(
        context: Vec<ChatItem>,
        mode: AgentMode,
        parallel_tool_use: bool,
        shared: Arc<SharedExtract>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: new_task_id(),
            context,
            mode,
            parallel_tool_use,
            shared,
            model: model.into(),
            registry: tools::mode_registry(mode),
        }
    }

    fn tool_input(&self, env: &TaskEnv, call: ToolCall, task_chats: Vec<ChatItem>) -> ToolInput {
        ToolInput {
            call,
            app: env.app.clone(),
            output: env.output.clone(),
            prompter: None,
            allow_map: Arc::new(Mutex::new(HashSet::new())),
            is_task: true,
            task_chats,
            shared: Some(self.shared.clone()),
            abort: env.abort.clone(),
        }
    }

    /// Status line for the parallel calls of the current round.
    fn parallel_calls_text(&self, calls: &[ToolCall]) -> String {
        let mut text = String::new();
        for (idx, call) in calls.iter().enumerate() {
            if let Some(desc) = self.registry.get(&call.function.name) {
                if !desc.intent.is_empty() {
                    text.push_str(&format!("SubTask[{}]. {}\n", idx + 1, desc.intent));
                }
            }
        }
        text
    }

    async fn dispatch_sequential(
        &self,
        env: &TaskEnv,
        call: ToolCall,
    ) -> Result<ToolOutput, AgentError> {
        let input = self.tool_input(env, call.clone(), self.context.clone());
        let mut output = tools::dispatch(&self.registry, input).await;
        if let Some(message) = output.interrupt.take() {
            return Err(AgentError::TaskInterrupt(message));
        }
        if let Some(error) = output.error.take() {
            output.content = format!("error: {error}");
        }
        Ok(output)
    }

    /// Run every call of the round concurrently. Each handler gets its own
    /// copy of the chat list as it stood before the round; results come back
    /// in call order regardless of completion order.
    async fn dispatch_parallel(
        &self,
        env: &TaskEnv,
        calls: Vec<ToolCall>,
    ) -> Result<Vec<ToolOutput>, AgentError> {
        let pre_chats = self.context.clone();
        let futures: Vec<_> = calls
            .into_iter()
            .map(|call| {
                let input = self.tool_input(env, call.clone(), pre_chats.clone());
                let registry = self.registry.clone();
                async move {
                    let mut output = tools::dispatch(&registry, input).await;
                    if output.tool_call.is_none() {
                        output.tool_call = Some(call);
                    }
                    output
                }
            })
            .collect();

        let mut results = futures::future::join_all(futures).await;
        for output in &mut results {
            if let Some(message) = &output.interrupt {
                return Err(AgentError::TaskInterrupt(message.clone()));
            }
            if let Some(error) = output.error.take() {
                output.content = format!("error: {error}");
            }
        }
        Ok(results)
    }

    pub async fn run(&mut self, env: &TaskEnv) -> Result<TaskOutcome, AgentError> {
        let model_conf = env.app.config.require_model(&self.model)?.clone();
        let mut outcome = TaskOutcome::default();

        loop {
            if self.context.is_empty() {
                break;
            }
            // Providers reject a transcript ending on an assistant turn.
            if self
                .context
                .last()
                .is_some_and(|item| item.role == Some(bergo_llm::Role::Assistant))
            {
                let query = Query::new("continue your work", self.mode);
                self.context.push(ChatItem::user(query.build()));
            }

            let chats = inject_system_prompt(self.context.clone(), self.mode.prompt());
            let mut streamer = env
                .app
                .factory
                .open_stream(
                    env.abort.clone(),
                    &model_conf,
                    chats,
                    self.registry.schemas(),
                )
                .await?;
            let mut content = String::new();
            let mut reasoning_content = String::new();
            while let Some(delta) = streamer.next().await {
                content.push_str(&delta.content);
                reasoning_content.push_str(&delta.reasoning_content);
            }
            if let Some(error) = streamer.take_error() {
                return Err(error.into());
            }

            let tool_calls: Vec<ToolCall> = streamer.tool_calls().to_vec();
            self.context.push(ChatItem {
                role: Some(bergo_llm::Role::Assistant),
                message: content.clone(),
                reasoning_content,
                signature: streamer.signature().to_string(),
                tool_calls: tool_calls.clone(),
                ..Default::default()
            });

            let mut stop_loop = false;
            let mut parallel_calls: Vec<ToolCall> = Vec::new();
            let mut answers: Vec<ToolOutput> = Vec::new();
            for call in &tool_calls {
                if call.function.name == tools::TOOL_STOP_LOOP
                    || call.function.name == tools::TOOL_EXTRACT_RESULT
                {
                    outcome.tool_call = Some(call.clone());
                    if call.function.name == tools::TOOL_STOP_LOOP {
                        let args: StopLoopArgs =
                            serde_json::from_str(&call.function.arguments).unwrap_or(StopLoopArgs {
                                message: String::new(),
                            });
                        outcome.content = args.message;
                    }
                    stop_loop = true;
                }
                if self.parallel_tool_use {
                    parallel_calls.push(call.clone());
                    continue;
                }
                answers.push(self.dispatch_sequential(env, call.clone()).await?);
            }

            self.shared.usage_update(streamer.token_usage());
            self.shared
                .update_task_progress(&self.id, &content, &tool_calls, streamer.token_usage());
            if self.mode == AgentMode::Berag {
                self.shared
                    .set_sub_task_info(self.parallel_calls_text(&parallel_calls));
            }
            if matches!(self.mode, AgentMode::Berag | AgentMode::BeragExtract) {
                let usage = self.shared.get_usage();
                env.output.update_tail(&format!(
                    "berag running... total usage {usage}\n{}",
                    self.shared.get_sub_task_info()
                ));
            }

            if stop_loop {
                break;
            }
            if self.parallel_tool_use {
                answers = self.dispatch_parallel(env, parallel_calls).await?;
            }
            for answer in answers {
                let tool_call_id = answer
                    .tool_call
                    .as_ref()
                    .map(|call| call.id.clone())
                    .unwrap_or_default();
                self.context
                    .push(ChatItem::tool_result(tool_call_id, answer.content));
            }
        }

        Ok(outcome)
    }
}
