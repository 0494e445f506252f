use crate::config::ModelConfig;
use crate::errors::LlmError;
use crate::provider::{provider_for, LlmProvider};
use crate::providers::mock::{MockProvider, MockScript};
use crate::rate_limit::RateLimiter;
use crate::types::{finish_reason, ChatItem, ChatRequest, ResponseDelta, TokenUsage, ToolCall, ToolSchema};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Cancellation handle shared between the consumer, the signal handler, and
/// the provider's HTTP reader task.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub async fn notified(&self) {
        let notified = self.notify.notified();
        if self.is_aborted() {
            return;
        }
        notified.await;
    }

    /// Clear the flag so the handle can be reused for the next stream.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }
}

/// Shared constructor for streamers. Owns the process-wide [`RateLimiter`]
/// and, for tests, the scripted mock providers.
#[derive(Default)]
pub struct ClientFactory {
    rate_limiter: RateLimiter,
    mock_scripts: Mutex<HashMap<String, Arc<MockScript>>>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Register a scripted mock for a model identifier with
    /// `provider = "mock"`.
    pub fn register_mock(&self, identifier: impl Into<String>, script: Arc<MockScript>) {
        let mut scripts = self
            .mock_scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        scripts.insert(identifier.into(), script);
    }

    fn build_provider(&self, conf: &ModelConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
        if conf.provider == "mock" {
            let scripts = self
                .mock_scripts
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let script = scripts.get(&conf.identifier).cloned().ok_or_else(|| {
                LlmError::Configuration(format!(
                    "no mock script registered for '{}'",
                    conf.identifier
                ))
            })?;
            return Ok(Box::new(MockProvider::with_script(script)));
        }
        provider_for(conf)
    }

    /// Open one streaming turn. Blocks on the rate limiter first when the
    /// model configures an interval.
    pub async fn open_stream(
        &self,
        abort: AbortHandle,
        conf: &ModelConfig,
        chats: Vec<ChatItem>,
        tools: Vec<ToolSchema>,
    ) -> Result<LlmStreamer, LlmError> {
        self.rate_limiter
            .wait_turn(&conf.identifier, conf.rate_limit_interval)
            .await;
        let provider = self.build_provider(conf)?;
        let rx = provider.stream(
            abort.clone(),
            ChatRequest {
                chat_items: chats.clone(),
                tools: tools.clone(),
            },
        );
        Ok(LlmStreamer {
            provider,
            conf: conf.clone(),
            chats,
            tools,
            abort,
            rx,
            content: String::new(),
            reasoning_content: String::new(),
            signature: String::new(),
            tool_calls: Vec::new(),
            usage: TokenUsage::default(),
            error: None,
            tried_prefill: false,
        })
    }
}

/// One streaming model turn. Yields merged deltas via [`LlmStreamer::next`];
/// after the stream ends, [`LlmStreamer::error`] reports whether it ended
/// cleanly.
pub struct LlmStreamer {
    provider: Box<dyn LlmProvider>,
    conf: ModelConfig,
    chats: Vec<ChatItem>,
    tools: Vec<ToolSchema>,
    abort: AbortHandle,
    rx: mpsc::Receiver<Result<ResponseDelta, LlmError>>,
    content: String,
    reasoning_content: String,
    signature: String,
    tool_calls: Vec<ToolCall>,
    usage: TokenUsage,
    error: Option<LlmError>,
    tried_prefill: bool,
}

impl LlmStreamer {
    /// Await the next delta. Returns `None` when the stream is over (cleanly
    /// or not); check [`error`](Self::error) afterwards.
    pub async fn next(&mut self) -> Option<ResponseDelta> {
        let received = tokio::select! {
            _ = self.abort.notified() => {
                self.error = Some(LlmError::Interrupted);
                return None;
            }
            received = self.rx.recv() => received,
        };
        let delta = match received? {
            Ok(delta) => delta,
            Err(error) => {
                self.error = Some(error);
                return None;
            }
        };

        if let Some(usage) = &delta.usage {
            self.usage.accumulate(usage);
        }
        self.reasoning_content.push_str(&delta.reasoning_content);
        self.content.push_str(&delta.content);
        self.signature.push_str(&delta.signature);
        for tool_call in &delta.tool_calls {
            self.merge_tool_call(tool_call.clone());
        }

        match delta.finish_reason.as_str() {
            finish_reason::STOP | finish_reason::TOOL_CALLS => Some(delta),
            "" | finish_reason::NULL => Some(delta),
            finish_reason::LENGTH if self.conf.prefill => {
                if self.tried_prefill {
                    self.error = Some(LlmError::FinishReason(finish_reason::LENGTH.to_string()));
                    return None;
                }
                // The retried stream continues transparently.
                self.reissue_with_prefill();
                Some(delta)
            }
            other => {
                self.error = Some(LlmError::FinishReason(other.to_string()));
                Some(delta)
            }
        }
    }

    /// Re-issue the request with the partial assistant answer as a prefix
    /// message so the model continues where it was cut off.
    fn reissue_with_prefill(&mut self) {
        self.tried_prefill = true;
        let mut chats = self.chats.clone();
        chats.push(ChatItem {
            role: Some(crate::types::Role::Assistant),
            message: self.content.clone(),
            reasoning_content: self.reasoning_content.clone(),
            prefix: true,
            ..Default::default()
        });
        self.content.clear();
        self.reasoning_content.clear();
        self.rx = self.provider.stream(
            self.abort.clone(),
            ChatRequest {
                chat_items: chats,
                tools: self.tools.clone(),
            },
        );
    }

    /// Merge a streamed tool-call fragment.
    ///
    /// An id-bearing delta opens a new slot (a literal `{}` arguments payload
    /// is cleared so later fragments concatenate cleanly); an index-bearing
    /// delta appends to the slot with the matching index; a delta with
    /// neither appends to the most recently opened slot.
    fn merge_tool_call(&mut self, mut tool_call: ToolCall) {
        if !tool_call.id.is_empty() {
            if tool_call.function.arguments == "{}" {
                tool_call.function.arguments.clear();
            }
            self.tool_calls.push(tool_call);
            return;
        }
        let Some(index) = tool_call.index else {
            if let Some(last) = self.tool_calls.last_mut() {
                last.function.arguments.push_str(&tool_call.function.arguments);
            }
            return;
        };
        if let Some(slot) = self
            .tool_calls
            .iter_mut()
            .find(|slot| slot.index == Some(index))
        {
            slot.function.arguments.push_str(&tool_call.function.arguments);
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn error(&self) -> Option<&LlmError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<LlmError> {
        self.error.take()
    }

    /// Drain the stream and return the accumulated reasoning and content.
    pub async fn read_full(&mut self) -> (String, String) {
        while self.next().await.is_some() {}
        (self.reasoning_content.clone(), self.content.clone())
    }
}
