//! End-to-end engine scenarios driven through scripted mock providers.

use bergo_agent::io::Interrupted;
use bergo_agent::tools::{self, ToolInput, ToolRegistry};
use bergo_agent::{Agent, AppConfig, AppContext, MsgKind, OutputSink, Prompter};
use bergo_llm::providers::mock::MockScript;
use bergo_llm::{finish_reason, AbortHandle, ModelConfig, ResponseDelta, TokenUsage, ToolCall};
use bergo_session::timeline::COMPACT_RECOVERY_MESSAGE;
use bergo_session::{StorePaths, TimelinePayload};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct BufferedOutput {
    system: Mutex<Vec<String>>,
    llm: Mutex<String>,
}

impl BufferedOutput {
    fn system_messages(&self) -> Vec<String> {
        self.system.lock().expect("system lock").clone()
    }
}

impl OutputSink for BufferedOutput {
    fn on_llm_delta(&self, delta: &str, _reasoning: bool) {
        self.llm.lock().expect("llm lock").push_str(delta);
    }

    fn on_system(&self, msg: &str, _kind: MsgKind) {
        self.system.lock().expect("system lock").push(msg.to_string());
    }

    fn update_tail(&self, _msg: &str) {}

    fn stop(&self) -> String {
        std::mem::take(&mut *self.llm.lock().expect("llm lock"))
    }
}

struct ScriptedPrompter {
    selections: Mutex<VecDeque<String>>,
    select_calls: AtomicUsize,
}

impl ScriptedPrompter {
    fn new(selections: Vec<&str>) -> Self {
        Self {
            selections: Mutex::new(selections.into_iter().map(String::from).collect()),
            select_calls: AtomicUsize::new(0),
        }
    }

    fn select_count(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&self, _multiline: bool) -> Result<String, Interrupted> {
        Err(Interrupted)
    }

    fn select(&self, _prompt: &str, options: &[&str]) -> String {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.selections
            .lock()
            .expect("selections lock")
            .pop_front()
            .unwrap_or_else(|| options.first().copied().unwrap_or_default().to_string())
    }

    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    workspace: PathBuf,
    app: Arc<AppContext>,
    output: Arc<BufferedOutput>,
    prompter: Arc<ScriptedPrompter>,
}

fn mock_model(identifier: &str, context_window: u64) -> ModelConfig {
    ModelConfig {
        identifier: identifier.to_string(),
        provider: "mock".to_string(),
        context_window,
        ..Default::default()
    }
}

fn fixture(context_window: u64, compact_threshold: f64, selections: Vec<&str>) -> Fixture {
    let tmp = tempfile::tempdir().expect("tempdir");
    let workspace = tmp.path().join("workspace");
    std::fs::create_dir_all(&workspace).expect("workspace");
    let paths = StorePaths::rooted(tmp.path().join("home"), &workspace).expect("paths");

    let mut config = AppConfig {
        main_model: "mock-main".to_string(),
        berag_model: "mock-berag".to_string(),
        berag_extract_model: "mock-extract".to_string(),
        compact_threshold,
        models: vec![
            mock_model("mock-main", context_window),
            mock_model("mock-berag", 0),
            mock_model("mock-extract", 0),
        ],
        ..Default::default()
    };
    config.set_defaults();

    Fixture {
        workspace,
        app: Arc::new(AppContext::new(config, paths)),
        output: Arc::new(BufferedOutput::default()),
        prompter: Arc::new(ScriptedPrompter::new(selections)),
        _tmp: tmp,
    }
}

impl Fixture {
    fn agent(&self) -> Agent {
        Agent::new(
            self.app.clone(),
            self.output.clone(),
            self.prompter.clone(),
        )
        .expect("agent")
    }

    fn write_file(&self, name: &str, content: &str) -> String {
        let path = self.workspace.join(name);
        std::fs::write(&path, content).expect("seed file");
        path.to_string_lossy().to_string()
    }
}

fn content(text: &str) -> ResponseDelta {
    ResponseDelta::content(text)
}

fn finish(reason: &str) -> ResponseDelta {
    ResponseDelta::finish(reason)
}

fn call(id: &str, name: &str, args: &str) -> ResponseDelta {
    ResponseDelta {
        tool_calls: vec![ToolCall::new(id, name, args)],
        ..Default::default()
    }
}

fn usage(total: u64) -> ResponseDelta {
    ResponseDelta {
        usage: Some(TokenUsage {
            prompt_tokens: total / 2,
            completion_tokens: total - total / 2,
            total_tokens: total,
            cached_tokens: 0,
        }),
        ..Default::default()
    }
}

fn payloads(agent: &Agent) -> Vec<&TimelinePayload> {
    agent.timeline().items.iter().map(|item| &item.payload).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s1_simple_single_turn() {
    let fx = fixture(0, 0.8, vec![]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![vec![content("hi there"), finish(finish_reason::STOP)]]),
    );

    let mut agent = fx.agent();
    agent.step("hello".to_string()).await;

    let items = payloads(&agent);
    assert_eq!(items.len(), 3);
    match items[0] {
        TimelinePayload::UserInput(query) => assert_eq!(query.user_input, "hello"),
        other => panic!("expected user input, got {other:?}"),
    }
    assert!(matches!(items[1], TimelinePayload::CheckpointSave(_)));
    match items[2] {
        TimelinePayload::LlmResponse(response) => {
            assert_eq!(response.content, "hi there");
            assert!(response.tool_calls.is_empty());
        }
        other => panic!("expected llm response, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s2_tool_dispatch_and_stop_loop() {
    let fx = fixture(0, 0.8, vec![]);
    let file = fx.write_file("a.txt", "X\n");
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            vec![
                call("c1", "read_file", &format!(r#"{{"path":"{file}"}}"#)),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                content("done"),
                call("c2", "stop_loop", r#"{"message":"ok"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("read my file".to_string()).await;

    let items = payloads(&agent);
    // UserInput, CheckpointSave, LLMResponse, ToolUse, LLMResponse, ToolUse
    assert_eq!(items.len(), 6);
    match items[2] {
        TimelinePayload::LlmResponse(response) => {
            assert_eq!(response.tool_calls.len(), 1);
            assert_eq!(response.tool_calls[0].function.name, "read_file");
        }
        other => panic!("expected llm response, got {other:?}"),
    }
    match items[3] {
        TimelinePayload::ToolUse(tool_use) => {
            assert_eq!(tool_use.tool_id, "c1");
            assert!(tool_use.content.contains("1|X"));
        }
        other => panic!("expected tool use, got {other:?}"),
    }
    match items[4] {
        TimelinePayload::LlmResponse(response) => {
            assert_eq!(response.content, "done");
            assert_eq!(response.tool_calls[0].function.name, "stop_loop");
        }
        other => panic!("expected llm response, got {other:?}"),
    }
    match items[5] {
        TimelinePayload::ToolUse(tool_use) => {
            assert_eq!(tool_use.tool_id, "c2");
            assert_eq!(tool_use.content, "ok");
        }
        other => panic!("expected tool use, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_calls_on_assistant_event_match_tool_use_events() {
    let fx = fixture(0, 0.8, vec![]);
    let f1 = fx.write_file("one.txt", "1\n");
    let f2 = fx.write_file("two.txt", "2\n");
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            vec![
                call("c1", "read_file", &format!(r#"{{"path":"{f1}"}}"#)),
                call("c2", "read_file", &format!(r#"{{"path":"{f2}"}}"#)),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                call("c3", "stop_loop", r#"{"message":"done"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("read both".to_string()).await;

    let items = payloads(&agent);
    let assistant_calls: Vec<String> = match items[2] {
        TimelinePayload::LlmResponse(response) => {
            response.tool_calls.iter().map(|call| call.id.clone()).collect()
        }
        other => panic!("expected llm response, got {other:?}"),
    };
    let tool_use_ids: Vec<String> = items[3..5]
        .iter()
        .map(|payload| match payload {
            TimelinePayload::ToolUse(tool_use) => tool_use.tool_id.clone(),
            other => panic!("expected tool use, got {other:?}"),
        })
        .collect();
    assert_eq!(assistant_calls, tool_use_ids);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn s3_parallel_berag_aggregates_extracts() {
    let fx = fixture(0, 0.8, vec![]);
    let f1 = fx.write_file("f1.rs", "fn one() {}\n");
    let f2 = fx.write_file("f2.rs", "fn two() {}\n");

    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            vec![
                call("m1", "berag", r#"{"content":"find X"}"#),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                content("done"),
                call("m2", "stop_loop", r#"{"message":"finished"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );
    fx.app.factory.register_mock(
        "mock-berag",
        MockScript::new(vec![
            vec![
                usage(10),
                call("b1", "berag_extract", &format!(r#"{{"file_path":"{f1}"}}"#)),
                call("b2", "berag_extract", &format!(r#"{{"file_path":"{f2}"}}"#)),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                usage(5),
                call("b3", "stop_loop", r#"{"message":"search summary"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );
    fx.app.factory.register_mock(
        "mock-extract",
        MockScript::new(vec![
            vec![
                usage(3),
                call(
                    "e1",
                    "extract_result",
                    &format!(
                        r#"{{"summary":"first file","extract_items":[{{"path":"{f1}"}}]}}"#
                    ),
                ),
                finish(finish_reason::STOP),
            ],
            vec![
                usage(3),
                call(
                    "e2",
                    "extract_result",
                    &format!(
                        r#"{{"summary":"second file","extract_items":[{{"path":"{f2}"}}]}}"#
                    ),
                ),
                finish(finish_reason::STOP),
            ],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("find X".to_string()).await;

    let items = payloads(&agent);
    let berag_result = items
        .iter()
        .find_map(|payload| match payload {
            TimelinePayload::ToolUse(tool_use) if tool_use.tool_name == "berag" => {
                Some(tool_use.content.clone())
            }
            _ => None,
        })
        .expect("berag tool result");

    assert!(berag_result.contains("<summary>search summary</summary>"));
    assert!(berag_result.contains(&format!("<extract_item>## {f1}")));
    assert!(berag_result.contains(&format!("<extract_item>## {f2}")));
    assert!(berag_result.contains("fn one()"));
    assert!(berag_result.contains("fn two()"));

    let found = fx
        .output
        .system_messages()
        .into_iter()
        .find(|msg| msg.contains("berag found"));
    assert_eq!(
        found.as_deref().map(|msg| msg.starts_with("berag found 2 items")),
        Some(true)
    );
    // Usage over the whole request: berag rounds (10 + 5) plus both extract
    // streams (3 + 3).
    assert!(found.expect("found message").contains("Total: 21"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s5_compaction_triggers_and_resets_transcript() {
    let fx = fixture(1000, 0.5, vec![]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            // Crosses 0.5 * 1000 and is discarded in favor of compaction.
            vec![content("long answer"), usage(600), finish(finish_reason::STOP)],
            // Served to the compact task.
            vec![
                call("cc", "stop_loop", r#"{"message":"memento updated"}"#),
                finish(finish_reason::STOP),
            ],
            // First round after the reset.
            vec![content("after compact"), usage(10), finish(finish_reason::STOP)],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("work on something big".to_string()).await;

    let items = payloads(&agent);
    assert!(items
        .iter()
        .any(|payload| matches!(payload, TimelinePayload::Compact(_))));
    assert!(!items.iter().any(|payload| matches!(
        payload,
        TimelinePayload::LlmResponse(response) if response.content == "long answer"
    )));

    let chats = agent.timeline().get_chat_context(true);
    assert_eq!(chats[0].message, COMPACT_RECOVERY_MESSAGE);
    assert_eq!(chats.last().expect("tail chat").message, "after compact");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn approval_skip_returns_error_to_model() {
    let fx = fixture(0, 0.8, vec!["Skip"]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            vec![
                call("c1", "shell_cmd", r#"{"command":"echo hi"}"#),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                call("c2", "stop_loop", r#"{"message":"done"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("run it".to_string()).await;

    let items = payloads(&agent);
    let shell_result = items
        .iter()
        .find_map(|payload| match payload {
            TimelinePayload::ToolUse(tool_use) if tool_use.tool_name == "shell_cmd" => {
                Some(tool_use.content.clone())
            }
            _ => None,
        })
        .expect("shell result");
    assert_eq!(shell_result, "User choose to skip");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn approval_always_yes_is_remembered_for_the_session() {
    let fx = fixture(0, 0.8, vec!["Always Yes"]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            vec![
                call("c1", "shell_cmd", r#"{"command":"echo first"}"#),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                call("c2", "shell_cmd", r#"{"command":"echo second"}"#),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                call("c3", "stop_loop", r#"{"message":"done"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("run both".to_string()).await;

    assert_eq!(fx.prompter.select_count(), 1);
    let outputs: Vec<String> = payloads(&agent)
        .iter()
        .filter_map(|payload| match payload {
            TimelinePayload::ToolUse(tool_use) if tool_use.tool_name == "shell_cmd" => {
                Some(tool_use.content.clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(outputs.len(), 2);
    assert!(outputs[0].contains("first"));
    assert!(outputs[1].contains("second"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn schema_violation_and_unknown_tool_become_tool_results() {
    let fx = fixture(0, 0.8, vec![]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            vec![
                call("c1", "read_file", "{}"),
                call("c2", "teleport", "{}"),
                finish(finish_reason::TOOL_CALLS),
            ],
            vec![
                call("c3", "stop_loop", r#"{"message":"done"}"#),
                finish(finish_reason::STOP),
            ],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("go".to_string()).await;

    let items = payloads(&agent);
    let tool_results: Vec<(String, String)> = items
        .iter()
        .filter_map(|payload| match payload {
            TimelinePayload::ToolUse(tool_use) => {
                Some((tool_use.tool_id.clone(), tool_use.content.clone()))
            }
            _ => None,
        })
        .collect();
    let validation = tool_results
        .iter()
        .find(|(id, _)| id == "c1")
        .expect("validation result");
    assert!(validation.1.contains("path"));
    let unknown = tool_results
        .iter()
        .find(|(id, _)| id == "c2")
        .expect("unknown tool result");
    assert!(unknown.1.contains("tool teleport not found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_round_replaces_pending_user_turn() {
    let fx = fixture(0, 0.8, vec![]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![
            // Non-retryable finish: the round errors out with no response.
            vec![finish(finish_reason::CONTENT_FILTER)],
            vec![content("second answer"), finish(finish_reason::STOP)],
        ]),
    );

    let mut agent = fx.agent();
    agent.step("first question".to_string()).await;
    agent.step("second question".to_string()).await;

    let user_inputs: Vec<String> = payloads(&agent)
        .iter()
        .filter_map(|payload| match payload {
            TimelinePayload::UserInput(query) => Some(query.user_input.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(user_inputs, vec!["second question".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn memento_is_stashed_after_each_task() {
    let fx = fixture(0, 0.8, vec![]);
    fx.app.factory.register_mock(
        "mock-main",
        MockScript::new(vec![vec![content("hi"), finish(finish_reason::STOP)]]),
    );

    let mut agent = fx.agent();
    agent.step("hello".to_string()).await;

    assert!(!fx.workspace.join(".bergo.memento").exists());
    assert!(fx
        .app
        .paths
        .memento_mirror(agent.session_id())
        .exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remove_outside_workspace_interrupts_a_sub_task() {
    let fx = fixture(0, 0.8, vec![]);
    let mut registry = ToolRegistry::default();
    registry.register(tools::remove::remove_tool());

    let input = ToolInput {
        call: ToolCall::new("c1", "remove", r#"{"path":"/etc/hosts"}"#),
        app: fx.app.clone(),
        output: fx.output.clone(),
        prompter: None,
        allow_map: Arc::new(Mutex::new(HashSet::new())),
        is_task: true,
        task_chats: Vec::new(),
        shared: None,
        abort: AbortHandle::new(),
    };
    let output = tools::dispatch(&registry, input).await;
    let message = output.interrupt.expect("interrupt error");
    assert!(message.contains("outside of the workspace"));
}
