use crate::config::ModelConfig;
use crate::errors::LlmError;
use crate::streamer::AbortHandle;
use crate::types::{ChatRequest, ResponseDelta};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Capacity of the delta channel between the HTTP reader task and the
/// consumer.
pub const DELTA_CHANNEL_CAPACITY: usize = 8;

/// A streaming chat provider. `stream` spawns the HTTP read on a worker task
/// and returns the receiving end of a bounded channel; the final item is
/// either a finish-reason delta or an error.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn init(&mut self, conf: &ModelConfig) -> Result<(), LlmError>;

    fn stream(
        &self,
        abort: AbortHandle,
        request: ChatRequest,
    ) -> mpsc::Receiver<Result<ResponseDelta, LlmError>>;

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }
}

/// Build an initialized provider for a model configuration.
///
/// The `openai` provider speaks the OpenAI-compatible chat-completions wire
/// format and covers the deepseek/kimi/openrouter family via `base_url`.
pub fn provider_for(conf: &ModelConfig) -> Result<Box<dyn LlmProvider>, LlmError> {
    let mut provider: Box<dyn LlmProvider> = match conf.provider.as_str() {
        "openai" | "deepseek" | "kimi" | "openrouter" | "minimax" | "xiaomi" => {
            Box::new(crate::providers::openai::OpenAiProvider::default())
        }
        "mock" => Box::new(crate::providers::mock::MockProvider::default()),
        other => return Err(LlmError::UnsupportedProvider(other.to_string())),
    };
    provider.init(conf)?;
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let conf = ModelConfig {
            provider: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            provider_for(&conf),
            Err(LlmError::UnsupportedProvider(_))
        ));
    }
}
