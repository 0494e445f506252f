//! The main agent: outer read-eval loop and inner task loop.

mod commands;

use crate::context::AppContext;
use crate::errors::AgentError;
use crate::io::{Interrupted, MsgKind, OutputSink, Prompter};
use crate::stats::Stats;
use crate::task::TaskEnv;
use crate::tools::{self, ToolInput, ToolRegistry, TOOL_STOP_LOOP};
use bergo_llm::{inject_system_prompt, AbortHandle, ToolCall};
use bergo_session::memento;
use bergo_session::timeline::{generate_session_id, LlmResponseItem};
use bergo_session::{AgentMode, Attachment, Query, SessionRegistry, Timeline};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};

static AT_CMD_PATTERN: OnceLock<Regex> = OnceLock::new();

fn at_cmd_pattern() -> &'static Regex {
    AT_CMD_PATTERN.get_or_init(|| Regex::new(r"@\S+").expect("attachment pattern is valid"))
}

struct ToolAnswer {
    call: ToolCall,
    content: String,
    rendered: String,
}

pub struct Agent {
    app: Arc<AppContext>,
    output: Arc<dyn OutputSink>,
    prompter: Arc<dyn Prompter>,
    registry: ToolRegistry,
    timeline: Timeline,
    session_registry: SessionRegistry,
    session_id: String,
    main_model: String,
    mode: AgentMode,
    multiline: bool,
    attachments: Vec<Attachment>,
    stats: Stats,
    allow_map: Arc<Mutex<HashSet<String>>>,
    abort: AbortHandle,
    stop: bool,
    interrupt_count: u32,
    memento_stale: bool,
    recovery_session: Option<String>,
}

impl Agent {
    pub fn new(
        app: Arc<AppContext>,
        output: Arc<dyn OutputSink>,
        prompter: Arc<dyn Prompter>,
    ) -> Result<Self, AgentError> {
        let main_model = app.config.main_model.clone();
        let model_conf = app.config.require_model(&main_model)?;
        let registry = tools::main_registry(model_conf.support_vision);
        let mode = if app.config.debug {
            AgentMode::Debug
        } else {
            AgentMode::Agent
        };
        let stats = Stats {
            window_size: model_conf.context_window,
            ..Default::default()
        };
        let session_id = generate_session_id();
        let timeline = Timeline::new(&session_id, app.paths.clone());
        let session_registry = SessionRegistry::load(app.paths.clone());
        Ok(Self {
            app,
            output,
            prompter,
            registry,
            timeline,
            session_registry,
            session_id,
            main_model,
            mode,
            multiline: false,
            attachments: Vec::new(),
            stats,
            allow_map: Arc::new(Mutex::new(HashSet::new())),
            abort: AbortHandle::new(),
            stop: false,
            interrupt_count: 0,
            memento_stale: false,
            recovery_session: None,
        })
    }

    /// Open an existing session on the next turn instead of a fresh one.
    pub fn set_recovery_session(&mut self, session_id: impl Into<String>) {
        self.recovery_session = Some(session_id.into());
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stopped(&self) -> bool {
        self.stop
    }

    /// Handle shared between the engine and the signal listener; a pending
    /// abort cancels the in-flight stream.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// The read-eval loop: one user line per iteration until the stop flag.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        if let Some(session_id) = self.recovery_session.take() {
            self.load_session(&session_id);
        }
        loop {
            if self.stop {
                break;
            }
            self.output.stop();
            let line = self.read_from_user();
            if line.is_empty() {
                continue;
            }
            self.interrupt_count = 0;
            self.step(line).await;
        }
        Ok(())
    }

    /// Process one user line: command dispatch, attachment extraction, query
    /// gating, checkpoint, then the inner task loop.
    pub async fn step(&mut self, line: String) {
        let (filtered, consumed) = self.handle_cmd(&line);
        if consumed {
            return;
        }
        let Some(filtered) = self.process_at_command(&filtered) else {
            return;
        };
        if let Err(error) = self.timeline.init_checkpoint() {
            self.output
                .on_system(&format!("checkpoint unavailable: {error}"), MsgKind::Warning);
        }

        let mut query = Query::new(filtered.clone(), self.mode);
        query.set_attachments(std::mem::take(&mut self.attachments));
        if self.memento_stale {
            query.set_memento_update_remind();
            self.memento_stale = false;
        }
        if let Err(error) = memento::materialize(&self.app.paths, &self.session_id) {
            self.output
                .on_system(&format!("memento unavailable: {error}"), MsgKind::Warning);
        }

        self.output.on_system(&filtered, MsgKind::Dump);
        self.session_registry.add(&self.session_id, &filtered);
        if self.timeline.can_add_query() {
            self.timeline.add_user_input(query);
        } else {
            self.timeline.replace_last_user_input(query);
        }
        self.save_checkpoint();
        self.do_task().await;
    }

    fn read_from_user(&mut self) -> String {
        let multiline = std::mem::replace(&mut self.multiline, false);
        match self.prompter.read_line(multiline) {
            Ok(line) => line.trim().to_string(),
            Err(Interrupted) => {
                self.interrupt_count += 1;
                if self.interrupt_count == 1 {
                    self.output
                        .on_system("Press Ctrl+C or ESC again to exit", MsgKind::Text);
                } else {
                    self.stop = true;
                }
                String::new()
            }
        }
    }

    fn save_checkpoint(&mut self) {
        match self.timeline.checkpoint_save("auto save", self.stats.session) {
            Ok(hash) => {
                self.output
                    .on_system(&format!("checkpoint saved, hash: {hash}"), MsgKind::Text);
            }
            Err(error) => {
                self.output
                    .on_system(&format!("checkpoint save failed: {error}"), MsgKind::Warning);
            }
        }
    }

    /// Extract `@file:`/`@img:` references into attachments, leaving
    /// `[bergo-attch N]` placeholders in the text. Returns `None` when a
    /// reference is invalid; the turn is abandoned.
    fn process_at_command(&mut self, input: &str) -> Option<String> {
        let matches: Vec<String> = at_cmd_pattern()
            .find_iter(input)
            .map(|found| found.as_str().to_string())
            .collect();

        let mut filtered = input.to_string();
        let mut attachments = Vec::new();
        let mut index = 1usize;
        let support_vision = self
            .app
            .config
            .get_model(&self.main_model)
            .map(|model| model.support_vision)
            .unwrap_or(false);

        for matched in matches {
            if let Some(path) = matched.strip_prefix("@file:") {
                let Ok(metadata) = std::fs::metadata(path) else {
                    self.output
                        .on_system(&format!("invalid file path: {path}"), MsgKind::Warning);
                    return None;
                };
                filtered = filtered.replace(&matched, &format!("[bergo-attch {index}]"));
                if metadata.is_dir() {
                    attachments.push(Attachment::directory(index, path));
                } else {
                    attachments.push(Attachment::file(index, path));
                }
                index += 1;
            } else if let Some(path) = matched.strip_prefix("@img:") {
                if !support_vision {
                    self.output.on_system(
                        &format!("model {} does not support vision", self.main_model),
                        MsgKind::Warning,
                    );
                    return None;
                }
                if !std::path::Path::new(path).is_file() {
                    self.output
                        .on_system(&format!("invalid file path: {path}"), MsgKind::Warning);
                    return None;
                }
                filtered = filtered.replace(&matched, &format!("[bergo-attch {index}]"));
                attachments.push(Attachment::image(index, path));
                index += 1;
            }
        }
        self.attachments = attachments;
        Some(filtered)
    }

    async fn do_task(&mut self) {
        let memento_hash = memento::content_hash(&self.app.paths);
        self.do_task_inner().await;
        self.memento_stale =
            self.mode == AgentMode::Agent && !memento::is_changed(&self.app.paths, &memento_hash);
        memento::stash_if_present(&self.app.paths, &self.session_id);
    }

    async fn do_task_inner(&mut self) {
        self.timeline.clean_tail_tool_calls();
        self.timeline.set_task_epoch();
        let model_conf = match self.app.config.require_model(&self.main_model) {
            Ok(conf) => conf.clone(),
            Err(error) => {
                self.output
                    .on_system(&format!("error: {error}"), MsgKind::Warning);
                return;
            }
        };

        loop {
            if self.stop {
                break;
            }
            let chats =
                inject_system_prompt(self.timeline.get_chat_context(true), &self.app.system_prompt);
            self.abort.reset();
            let mut streamer = match self
                .app
                .factory
                .open_stream(
                    self.abort.clone(),
                    &model_conf,
                    chats,
                    self.registry.schemas(),
                )
                .await
            {
                Ok(streamer) => streamer,
                Err(error) => {
                    self.output
                        .on_system(&format!("error: {error}"), MsgKind::Warning);
                    break;
                }
            };

            self.output.on_system("Bergo: ", MsgKind::Dump);
            let mut content = String::new();
            let mut reasoning_content = String::new();
            while let Some(delta) = streamer.next().await {
                content.push_str(&delta.content);
                reasoning_content.push_str(&delta.reasoning_content);
                if !delta.reasoning_content.is_empty() {
                    self.output.on_llm_delta(&delta.reasoning_content, true);
                }
                if !delta.content.is_empty() {
                    self.output.on_llm_delta(&delta.content, false);
                }
                for tool_call in &delta.tool_calls {
                    if tool_call.function.name.is_empty() {
                        continue;
                    }
                    if let Some(desc) = self.registry.get(&tool_call.function.name) {
                        if !desc.intent.is_empty() {
                            self.output.update_tail(desc.intent);
                        }
                    }
                }
            }
            if let Some(error) = streamer.take_error() {
                self.output
                    .on_system(&format!("error: {error}"), MsgKind::Warning);
                break;
            }

            let rendered_content = self.output.stop();
            let tool_calls: Vec<ToolCall> = streamer.tool_calls().to_vec();
            let usage = streamer.token_usage();
            if !usage.is_empty() {
                self.stats.set_token_usage(&usage);
            }

            if self
                .stats
                .over_compact_threshold(self.app.config.compact_threshold)
            {
                self.compact().await;
                continue;
            }

            self.timeline.add_llm_response(LlmResponseItem {
                content,
                reasoning_content,
                rendered_content,
                tool_calls: tool_calls.clone(),
                signature: streamer.signature().to_string(),
            });

            let mut has_stop_loop = false;
            let mut answers: Vec<ToolAnswer> = Vec::new();
            for call in &tool_calls {
                if call.function.name == TOOL_STOP_LOOP {
                    has_stop_loop = true;
                }
                tracing::debug!("calling tool: {}", call.function.name);
                match self.do_tool_use(call.clone()).await {
                    Ok(answer) => answers.push(answer),
                    Err(error) => {
                        self.output.on_system(
                            &format!("error when tool call: {error}"),
                            MsgKind::Warning,
                        );
                        return;
                    }
                }
            }
            for answer in answers {
                self.timeline.add_tool_call_result(
                    answer.call.id.clone(),
                    answer.call.function.name.clone(),
                    answer.content,
                    answer.rendered,
                );
            }

            if has_stop_loop || tool_calls.is_empty() {
                break;
            }
        }
    }

    /// Dispatch one tool call from the main loop. Tool errors come back as
    /// answers for the model; only interrupt errors abort the task.
    async fn do_tool_use(&mut self, call: ToolCall) -> Result<ToolAnswer, AgentError> {
        let name = call.function.name.clone();
        let input = ToolInput {
            call: call.clone(),
            app: self.app.clone(),
            output: self.output.clone(),
            prompter: Some(self.prompter.clone()),
            allow_map: self.allow_map.clone(),
            is_task: false,
            task_chats: self.timeline.get_chat_context(false),
            shared: None,
            abort: self.abort.clone(),
        };
        let mut output = tools::dispatch(&self.registry, input).await;
        if let Some(message) = output.interrupt.take() {
            return Err(AgentError::TaskInterrupt(message));
        }
        let content = match output.error.take() {
            Some(error) => {
                self.output.on_system(
                    &format!("error when calling [{name}] err: {error}"),
                    MsgKind::Warning,
                );
                error
            }
            None => output.content,
        };
        let mut rendered = String::new();
        if let Some(desc) = self.registry.get(&name) {
            if let Some(render) = desc.render {
                rendered = render(&call, &content);
                self.output.on_system(&rendered, MsgKind::Dump);
            }
        }
        Ok(ToolAnswer {
            call,
            content,
            rendered,
        })
    }

    /// Fork the compaction task; on success a `Compact` event resets the
    /// model-visible context.
    async fn compact(&mut self) {
        let chats = self.timeline.get_chat_context(false);
        let env = TaskEnv {
            app: self.app.clone(),
            output: self.output.clone(),
            abort: self.abort.clone(),
        };
        match tools::compact::run_compact(&env, chats).await {
            Ok(_) => self.timeline.add_compact(None),
            Err(error) => {
                self.output
                    .on_system(&format!("compact error {error}"), MsgKind::Warning);
            }
        }
    }

    fn load_session(&mut self, session_id: &str) {
        self.session_id = session_id.to_string();
        self.timeline = Timeline::load(session_id, self.app.paths.clone());
        self.stats.session = self.timeline.last_checkpoint_token_usage();
        self.output
            .on_system(&format!("reload session: {session_id}"), MsgKind::Text);
        self.output
            .on_system(&self.timeline.history_dump(), MsgKind::Dump);
    }
}
