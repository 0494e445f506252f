//! Scripted provider for tests.
//!
//! A [`MockScript`] holds rounds of deltas; each `stream` call plays the next
//! round and advances, wrapping around at the end. Requests are recorded so
//! tests can assert on what was actually sent (prefill prefixes, synthetic
//! user turns, tool schemas).

use crate::config::ModelConfig;
use crate::errors::LlmError;
use crate::provider::{LlmProvider, DELTA_CHANNEL_CAPACITY};
use crate::streamer::AbortHandle;
use crate::types::{ChatRequest, ResponseDelta};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
pub struct MockScript {
    rounds: Vec<Vec<ResponseDelta>>,
    next_round: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
    hold_open: AtomicBool,
}

impl MockScript {
    pub fn new(rounds: Vec<Vec<ResponseDelta>>) -> Arc<Self> {
        Arc::new(Self {
            rounds,
            ..Default::default()
        })
    }

    /// Keep the channel open after a round so abort handling can be tested.
    pub fn hold_open(&self) {
        self.hold_open.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests().into_iter().last()
    }

    fn take_round(&self, request: ChatRequest) -> Vec<ResponseDelta> {
        {
            let mut requests = self
                .requests
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            requests.push(request);
        }
        if self.rounds.is_empty() {
            return Vec::new();
        }
        let idx = self.next_round.fetch_add(1, Ordering::SeqCst) % self.rounds.len();
        self.rounds[idx].clone()
    }
}

#[derive(Default)]
pub struct MockProvider {
    script: Option<Arc<MockScript>>,
}

impl MockProvider {
    pub fn with_script(script: Arc<MockScript>) -> Self {
        Self {
            script: Some(script),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn init(&mut self, _conf: &ModelConfig) -> Result<(), LlmError> {
        Ok(())
    }

    fn stream(
        &self,
        abort: AbortHandle,
        request: ChatRequest,
    ) -> mpsc::Receiver<Result<ResponseDelta, LlmError>> {
        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        let Some(script) = self.script.clone() else {
            return rx;
        };
        let round = script.take_round(request);
        let hold_open = script.hold_open.load(Ordering::SeqCst);
        tokio::spawn(async move {
            for delta in round {
                if abort.is_aborted() {
                    return;
                }
                if tx.send(Ok(delta)).await.is_err() {
                    return;
                }
            }
            if hold_open {
                abort.notified().await;
            }
        });
        rx
    }
}
